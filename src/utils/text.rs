use std::borrow::Cow;

/// Cuts `value` to at most `max_bytes` on a char boundary and notes how much
/// was dropped. Short values are borrowed as-is.
pub fn clip_for_log(value: &str, max_bytes: usize) -> Cow<'_, str> {
    if value.len() <= max_bytes {
        return Cow::Borrowed(value);
    }
    let mut end = max_bytes;
    while end > 0 && !value.is_char_boundary(end) {
        end -= 1;
    }
    Cow::Owned(format!(
        "{}... [{} bytes truncated]",
        &value[..end],
        value.len() - end
    ))
}

/// Renders an optional request id the way log lines expect it.
pub fn display_request_id(request_id: Option<&str>) -> &str {
    request_id.unwrap_or("None")
}
