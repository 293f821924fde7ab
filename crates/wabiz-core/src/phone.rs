/// Utilities for phone numbers as the Graph API expects them (`wa_id` form).

/// Normalize a user-entered number into digits only.
/// Example: "+55 (11) 99999-9999" -> "5511999999999"
pub fn normalize_phone(input: &str) -> String {
    input.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// E.164 allows at most 15 digits; anything shorter than 8 is not a routable number.
pub fn is_valid_phone(input: &str) -> bool {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return false;
    }
    let allowed = trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')' | '.'));
    let digits = normalize_phone(trimmed).len();
    allowed && (8..=15).contains(&digits)
}

/// Topic name of a user's real-time channel.
pub fn user_topic(user_id: &str) -> String {
    format!("user-{}", user_id)
}
