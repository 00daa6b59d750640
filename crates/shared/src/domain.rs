use std::{fmt, num::ParseIntError, str::FromStr};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Unix milliseconds of the platform epoch (2015-01-01T00:00:00Z).
pub const PLATFORM_EPOCH_MS: u64 = 1_420_070_400_000;

/// Creation time, in Unix milliseconds, embedded in a snowflake id.
pub fn snowflake_timestamp_ms(raw: u64) -> u64 {
    (raw >> 22) + PLATFORM_EPOCH_MS
}

struct SnowflakeVisitor;

impl de::Visitor<'_> for SnowflakeVisitor {
    type Value = u64;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a snowflake id as a decimal string or unsigned integer")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<u64, E> {
        value.trim().parse().map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<u64, E> {
        Ok(value)
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<u64, E> {
        u64::try_from(value).map_err(E::custom)
    }
}

// The API sends ids as JSON strings so they survive 53-bit float parsers.
macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u64);

        impl $name {
            pub fn timestamp_ms(self) -> u64 {
                snowflake_timestamp_ms(self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                deserializer.deserialize_any(SnowflakeVisitor).map(Self)
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(GuildId);
id_newtype!(ChannelId);
id_newtype!(MessageId);

/// Channel `type` codes as reported by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum ChannelKind {
    GuildText,
    Dm,
    GuildVoice,
    GroupDm,
    GuildCategory,
    GuildAnnouncement,
    Other(u8),
}

impl ChannelKind {
    pub fn is_private(self) -> bool {
        matches!(self, Self::Dm | Self::GroupDm)
    }

    /// Guild channel kinds whose message history can be paged and purged.
    pub fn is_guild_text(self) -> bool {
        matches!(self, Self::GuildText | Self::GuildAnnouncement)
    }
}

impl From<u8> for ChannelKind {
    fn from(code: u8) -> Self {
        match code {
            0 => Self::GuildText,
            1 => Self::Dm,
            2 => Self::GuildVoice,
            3 => Self::GroupDm,
            4 => Self::GuildCategory,
            5 => Self::GuildAnnouncement,
            other => Self::Other(other),
        }
    }
}

impl From<ChannelKind> for u8 {
    fn from(kind: ChannelKind) -> Self {
        match kind {
            ChannelKind::GuildText => 0,
            ChannelKind::Dm => 1,
            ChannelKind::GuildVoice => 2,
            ChannelKind::GroupDm => 3,
            ChannelKind::GuildCategory => 4,
            ChannelKind::GuildAnnouncement => 5,
            ChannelKind::Other(code) => code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountIdentity {
    pub id: UserId,
    pub display_name: String,
}

/// A DM or guild the account can purge its own messages from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SelectableTarget {
    Dm {
        channel_id: ChannelId,
        display_name: String,
        /// Unix ms of the last activity in the channel.
        recency_key: u64,
    },
    Guild {
        guild_id: GuildId,
        display_name: String,
    },
}

impl SelectableTarget {
    pub fn display_name(&self) -> &str {
        match self {
            Self::Dm { display_name, .. } | Self::Guild { display_name, .. } => display_name,
        }
    }

    pub fn recency_key(&self) -> Option<u64> {
        match self {
            Self::Dm { recency_key, .. } => Some(*recency_key),
            Self::Guild { .. } => None,
        }
    }

    pub fn is_dm(&self) -> bool {
        matches!(self, Self::Dm { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snowflake_ids_accept_strings_and_numbers() {
        let from_string: ChannelId = serde_json::from_str("\"175928847299117063\"").expect("string id");
        let from_number: ChannelId = serde_json::from_str("175928847299117063").expect("numeric id");
        assert_eq!(from_string, from_number);
        assert_eq!(
            serde_json::to_string(&from_string).expect("serialize"),
            "\"175928847299117063\""
        );
    }

    #[test]
    fn snowflake_timestamp_uses_platform_epoch() {
        assert_eq!(MessageId(175928847299117063).timestamp_ms(), 1_462_015_105_796);
        assert_eq!(snowflake_timestamp_ms(0), PLATFORM_EPOCH_MS);
    }

    #[test]
    fn channel_kind_round_trips_unknown_codes() {
        let kind: ChannelKind = serde_json::from_str("15").expect("kind");
        assert_eq!(kind, ChannelKind::Other(15));
        assert_eq!(u8::from(kind), 15);
        assert!(ChannelKind::from(5).is_guild_text());
        assert!(!ChannelKind::from(2).is_guild_text());
        assert!(ChannelKind::from(3).is_private());
    }
}
