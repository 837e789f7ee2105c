use ulid::Ulid;

pub const APPLICATION_ID_PREFIX: &str = "app_";

pub fn new_application_id() -> String {
    format!("{APPLICATION_ID_PREFIX}{}", Ulid::new())
}

pub fn is_application_id(s: &str) -> bool {
    s.strip_prefix(APPLICATION_ID_PREFIX)
        .is_some_and(|rest| Ulid::from_string(rest).is_ok())
}
