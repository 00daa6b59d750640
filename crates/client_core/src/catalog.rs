use std::sync::Arc;

use shared::{
    domain::SelectableTarget,
    protocol::{RawChannel, RawGuild},
};
use tracing::{info, warn};

use crate::{api::PlatformApi, session::Session};

/// Everything the account can pick from before starting a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    /// Newest activity first.
    pub dms: Vec<SelectableTarget>,
    /// API order.
    pub guilds: Vec<SelectableTarget>,
}

impl Catalog {
    pub fn into_parts(self) -> (Vec<SelectableTarget>, Vec<SelectableTarget>) {
        (self.dms, self.guilds)
    }

    pub fn is_empty(&self) -> bool {
        self.dms.is_empty() && self.guilds.is_empty()
    }
}

pub struct ChannelCatalog {
    api: Arc<dyn PlatformApi>,
}

impl ChannelCatalog {
    pub fn new(session: &Session) -> Self {
        Self { api: session.api() }
    }

    /// DM and group-DM channels sorted by recency; empty when listing fails.
    pub async fn build_dm_list(&self) -> Vec<SelectableTarget> {
        let channels = match self.api.list_dm_channels().await {
            Ok(channels) => channels,
            Err(err) => {
                warn!("catalog: failed to list dm channels: {err}");
                return Vec::new();
            }
        };

        let mut dms: Vec<_> = channels
            .iter()
            .filter(|channel| channel.kind.is_private())
            .map(dm_target)
            .collect();
        sort_by_recency(&mut dms);
        info!(count = dms.len(), "catalog: listed dm channels");
        dms
    }

    pub async fn build_guild_list(&self) -> Vec<SelectableTarget> {
        match self.api.list_guilds().await {
            Ok(guilds) => {
                info!(count = guilds.len(), "catalog: listed guilds");
                guilds.iter().map(guild_target).collect()
            }
            Err(err) => {
                warn!("catalog: failed to list guilds: {err}");
                Vec::new()
            }
        }
    }

    pub async fn build_catalog(&self) -> Catalog {
        let dms = self.build_dm_list().await;
        let guilds = self.build_guild_list().await;
        Catalog { dms, guilds }
    }
}

pub fn dm_target(channel: &RawChannel) -> SelectableTarget {
    let recipients: Vec<&str> = channel
        .recipients
        .iter()
        .map(|user| user.username.trim())
        .filter(|name| !name.is_empty())
        .collect();

    let display_name = if !recipients.is_empty() {
        format!("DM with {}", recipients.join(", "))
    } else {
        match channel.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("DM {}", channel.id),
        }
    };

    SelectableTarget::Dm {
        channel_id: channel.id,
        display_name,
        recency_key: channel.recency_key(),
    }
}

pub fn guild_target(guild: &RawGuild) -> SelectableTarget {
    let display_name = match guild.name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("Guild {}", guild.id),
    };
    SelectableTarget::Guild {
        guild_id: guild.id,
        display_name,
    }
}

/// Newest first; ties keep their listing order.
pub fn sort_by_recency(targets: &mut [SelectableTarget]) {
    targets.sort_by(|a, b| b.recency_key().cmp(&a.recency_key()));
}

#[cfg(test)]
#[path = "tests/catalog_tests.rs"]
mod tests;
