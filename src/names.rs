//! Conversions between component-side and DOM-side names.
//!
//! Inputs and outputs are declared in camel case (`someString`, `openSomePage`),
//! while attributes and event names are dash cased (`some-string`,
//! `open-some-page`).

/// Converts `camelCase` to `dash-case`.
///
/// Every ASCII uppercase letter becomes a dash followed by its lowercase form.
///
/// ```
/// use elementum::names::camel_to_dash_case;
///
/// assert_eq!(camel_to_dash_case("openSomePage"), "open-some-page");
/// ```
#[must_use]
pub fn camel_to_dash_case(input: &str) -> String {
    let mut output = String::with_capacity(input.len() + 4);
    for ch in input.chars() {
        if ch.is_ascii_uppercase() {
            output.push('-');
            output.push(ch.to_ascii_lowercase());
        } else {
            output.push(ch);
        }
    }
    output
}

/// Converts `dash-case` to `camelCase`.
///
/// A dash followed by a lowercase ASCII letter or a digit is replaced by the
/// uppercase form of that character. Other dashes are kept.
#[must_use]
pub fn dash_to_camel_case(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '-' {
            if let Some(&next) = chars.peek() {
                if next.is_ascii_lowercase() || next.is_ascii_digit() {
                    output.push(next.to_ascii_uppercase());
                    chars.next();
                    continue;
                }
            }
        }
        output.push(ch);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dash_cases_camel_names() {
        assert_eq!(camel_to_dash_case("someString"), "some-string");
        assert_eq!(camel_to_dash_case("value"), "value");
        assert_eq!(camel_to_dash_case("aBC"), "a-b-c");
    }

    #[test]
    fn camel_cases_dash_names() {
        assert_eq!(dash_to_camel_case("some-string"), "someString");
        assert_eq!(dash_to_camel_case("item-2"), "item2");
        assert_eq!(dash_to_camel_case("trailing-"), "trailing-");
        assert_eq!(dash_to_camel_case("double--dash"), "double-Dash");
    }
}
