use serde::{
    Deserialize, Deserializer, Serialize,
    de::{IgnoredAny, MapAccess, SeqAccess},
};

/// One stored staff application.
///
/// Records are created by [`crate::workflow::submit`] and never modified
/// afterwards. Reading accepts the legacy key names (`discord`, `servers`,
/// `why`) so documents written by older deployments keep loading. A record
/// missing any key, `id` and `createdAt` included, still loads with that
/// field empty rather than making the whole document unreadable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub created_at: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, alias = "discord", deserialize_with = "lenient_string")]
    pub discord_handle: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub age: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub country: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub activity: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub experience: String,
    #[serde(default, alias = "servers", deserialize_with = "lenient_string")]
    pub servers_worked_in: String,
    #[serde(default, alias = "why", deserialize_with = "lenient_string")]
    pub why_us: String,
}

/// Fields submitted by the public application form.
///
/// Keys follow the HTML form (`discord`, `servers`, `why`); the record's
/// camelCase names are accepted too. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ApplicationForm {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, alias = "discordHandle", deserialize_with = "lenient_string")]
    pub discord: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub age: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub country: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub activity: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub experience: String,
    #[serde(default, alias = "serversWorkedIn", deserialize_with = "lenient_string")]
    pub servers: String,
    #[serde(default, alias = "whyUs", deserialize_with = "lenient_string")]
    pub why: String,
}

impl ApplicationForm {
    pub fn into_record(self, id: String, created_at: String) -> ApplicationRecord {
        ApplicationRecord {
            id,
            created_at,
            name: self.name,
            discord_handle: self.discord,
            age: self.age,
            country: self.country,
            activity: self.activity,
            experience: self.experience,
            servers_worked_in: self.servers,
            why_us: self.why,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Staff,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Staff => "staff",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The identity attached to an authenticated browser session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPrincipal {
    pub username: String,
    pub role: Role,
}

/// Accepts any JSON value for a free-text field.
///
/// Form bodies only ever carry strings, but JSON submissions and legacy
/// documents may hold numbers (e.g. `"age": 19`). Arrays and objects are
/// skipped and read as the empty string.
pub(crate) fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;

    impl<'de> serde::de::Visitor<'de> for Visitor {
        type Value = String;

        fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("any JSON value")
        }

        fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_string<E: serde::de::Error>(self, v: String) -> Result<String, E> {
            Ok(v)
        }

        fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_f64<E: serde::de::Error>(self, v: f64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_bool<E: serde::de::Error>(self, v: bool) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_unit<E: serde::de::Error>(self) -> Result<String, E> {
            Ok(String::new())
        }

        fn visit_none<E: serde::de::Error>(self) -> Result<String, E> {
            Ok(String::new())
        }

        fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<String, D::Error> {
            d.deserialize_any(self)
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<String, A::Error> {
            while seq.next_element::<IgnoredAny>()?.is_some() {}
            Ok(String::new())
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<String, A::Error> {
            while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
            Ok(String::new())
        }
    }

    deserializer.deserialize_any(Visitor)
}
