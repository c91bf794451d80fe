//! First/last name derivation for remote user creation.
//!
//! The users dataset only carries a display name, but the remote create-user
//! call wants separate first and last names.

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split a display name into (first, last).
///
/// Tries, in order: whitespace-separated display name ("Carlos Antonio
/// Vives"), dot-separated display name ("carlos.vives"), then the email
/// local part ("carlos.vives@example.com"). Falls back to the whole
/// display name with an empty last name.
pub fn split_display_name(display_name: &str, email: &str) -> (String, String) {
    let display_name = display_name.trim();

    if display_name.contains(' ') {
        let mut parts = display_name.split_whitespace();
        let first = capitalize(parts.next().unwrap_or_default());
        let last = title_case(&parts.collect::<Vec<_>>().join(" "));
        return (first, last);
    }

    if display_name.contains('.') {
        return split_dotted(display_name);
    }

    if let Some(local) = email.split('@').next() {
        if local.contains('.') {
            return split_dotted(local);
        }
        if display_name.is_empty() {
            return (capitalize(local), String::new());
        }
    }

    (capitalize(display_name), String::new())
}

fn split_dotted(s: &str) -> (String, String) {
    let mut parts = s.splitn(2, '.');
    let first = capitalize(parts.next().unwrap_or_default());
    let last = capitalize(parts.next().unwrap_or_default());
    (first, last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn space_separated_display_name() {
        let (first, last) = split_display_name("Carlos Vives", "cv@example.com");
        assert_eq!(first, "Carlos");
        assert_eq!(last, "Vives");
    }

    #[test]
    fn multi_word_last_name() {
        let (first, last) = split_display_name("Carlos Antonio Vives", "cv@example.com");
        assert_eq!(first, "Carlos");
        assert_eq!(last, "Antonio Vives");
    }

    #[test]
    fn dot_separated_display_name() {
        let (first, last) = split_display_name("jane.doe", "jd@example.com");
        assert_eq!(first, "Jane");
        assert_eq!(last, "Doe");
    }

    #[test]
    fn falls_back_to_email_local_part() {
        let (first, last) = split_display_name("jdoe", "john.doe@example.com");
        assert_eq!(first, "John");
        assert_eq!(last, "Doe");
    }

    #[test]
    fn single_token_name_has_empty_last() {
        let (first, last) = split_display_name("Madonna", "madonna@example.com");
        assert_eq!(first, "Madonna");
        assert_eq!(last, "");
    }

    #[test]
    fn empty_name_uses_email() {
        let (first, last) = split_display_name("", "ops@example.com");
        assert_eq!(first, "Ops");
        assert_eq!(last, "");
    }
}
