use std::collections::BTreeSet;

use anyhow::bail;
use client_core::Catalog;
use shared::domain::{ChannelId, GuildId, SelectableTarget};

/// Which catalog entries a `purge run` invocation asked for.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub dms: Vec<ChannelId>,
    pub guilds: Vec<GuildId>,
    pub all_dms: bool,
    pub all_guilds: bool,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.dms.is_empty() && self.guilds.is_empty() && !self.all_dms && !self.all_guilds
    }
}

/// Resolves `selection` against the catalog: DMs first in recency order, then guilds in API
/// order, each target at most once.
pub fn select_targets(
    catalog: &Catalog,
    selection: &Selection,
) -> anyhow::Result<Vec<SelectableTarget>> {
    if selection.is_empty() {
        bail!("nothing selected: pass --dm, --guild, --all-dms or --all-guilds");
    }

    let wanted_dms: BTreeSet<ChannelId> = selection.dms.iter().copied().collect();
    let wanted_guilds: BTreeSet<GuildId> = selection.guilds.iter().copied().collect();

    let known_dms: BTreeSet<ChannelId> = catalog.dms.iter().filter_map(dm_channel).collect();
    let known_guilds: BTreeSet<GuildId> = catalog.guilds.iter().filter_map(guild).collect();

    let unknown_dms: Vec<String> = wanted_dms
        .difference(&known_dms)
        .map(ToString::to_string)
        .collect();
    if !unknown_dms.is_empty() {
        bail!("unknown DM channel id(s): {}", unknown_dms.join(", "));
    }
    let unknown_guilds: Vec<String> = wanted_guilds
        .difference(&known_guilds)
        .map(ToString::to_string)
        .collect();
    if !unknown_guilds.is_empty() {
        bail!("unknown guild id(s): {}", unknown_guilds.join(", "));
    }

    let dms = catalog.dms.iter().filter(|target| {
        selection.all_dms || dm_channel(target).is_some_and(|id| wanted_dms.contains(&id))
    });
    let guilds = catalog.guilds.iter().filter(|target| {
        selection.all_guilds || guild(target).is_some_and(|id| wanted_guilds.contains(&id))
    });
    Ok(dms.chain(guilds).cloned().collect())
}

fn dm_channel(target: &SelectableTarget) -> Option<ChannelId> {
    match target {
        SelectableTarget::Dm { channel_id, .. } => Some(*channel_id),
        SelectableTarget::Guild { .. } => None,
    }
}

fn guild(target: &SelectableTarget) -> Option<GuildId> {
    match target {
        SelectableTarget::Guild { guild_id, .. } => Some(*guild_id),
        SelectableTarget::Dm { .. } => None,
    }
}

#[cfg(test)]
#[path = "tests/selection_tests.rs"]
mod tests;
