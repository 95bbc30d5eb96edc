//! Channel roles and per-instrument buffer branches.

use crate::core::buffer::SampleBuffer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Semantic slot a raw channel is mapped into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelRole {
    Vertical,
    Horizontal1,
    Horizontal2,
}

impl ChannelRole {
    pub const ALL: [ChannelRole; 3] = [
        ChannelRole::Vertical,
        ChannelRole::Horizontal1,
        ChannelRole::Horizontal2,
    ];

    pub fn is_horizontal(self) -> bool {
        !matches!(self, ChannelRole::Vertical)
    }

    /// The other horizontal slot, if this is a horizontal.
    pub fn sibling(self) -> Option<ChannelRole> {
        match self {
            ChannelRole::Vertical => None,
            ChannelRole::Horizontal1 => Some(ChannelRole::Horizontal2),
            ChannelRole::Horizontal2 => Some(ChannelRole::Horizontal1),
        }
    }
}

impl fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelRole::Vertical => write!(f, "vertical"),
            ChannelRole::Horizontal1 => write!(f, "horizontal1"),
            ChannelRole::Horizontal2 => write!(f, "horizontal2"),
        }
    }
}

/// Lookup table from raw channel codes to roles.
///
/// Resolution tries the full code first and then its last character, so
/// `"HHZ"` resolves through a `"Z"` alias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleAliases {
    table: BTreeMap<String, ChannelRole>,
}

impl RoleAliases {
    pub fn new(table: BTreeMap<String, ChannelRole>) -> Self {
        Self { table }
    }

    pub fn resolve(&self, channel_code: &str) -> Option<ChannelRole> {
        if let Some(role) = self.table.get(channel_code) {
            return Some(*role);
        }
        let last = channel_code.chars().last()?;
        self.table.get(last.to_string().as_str()).copied()
    }

    /// Whether at least one code maps to `role`.
    pub fn covers(&self, role: ChannelRole) -> bool {
        self.table.values().any(|r| *r == role)
    }

    pub fn table(&self) -> &BTreeMap<String, ChannelRole> {
        &self.table
    }
}

impl Default for RoleAliases {
    fn default() -> Self {
        let table = [
            ("Z", ChannelRole::Vertical),
            ("3", ChannelRole::Vertical),
            ("N", ChannelRole::Horizontal1),
            ("1", ChannelRole::Horizontal1),
            ("E", ChannelRole::Horizontal2),
            ("2", ChannelRole::Horizontal2),
        ]
        .into_iter()
        .map(|(code, role)| (code.to_string(), role))
        .collect();
        Self { table }
    }
}

/// One role's buffer plus the bookkeeping eviction needs.
#[derive(Debug, Clone)]
pub struct ChannelSlot {
    /// Raw code that first claimed this role.
    pub code: String,
    pub buffer: SampleBuffer,
    /// Pulse number of the last append.
    pub last_update_pulse: u64,
}

/// Up to three buffers sharing an instrument identity, one per role.
#[derive(Debug, Clone, Default)]
pub struct InstrumentBranch {
    slots: BTreeMap<ChannelRole, ChannelSlot>,
}

impl InstrumentBranch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer(&self, role: ChannelRole) -> Option<&SampleBuffer> {
        self.slots.get(&role).map(|slot| &slot.buffer)
    }

    pub fn vertical(&self) -> Option<&SampleBuffer> {
        self.buffer(ChannelRole::Vertical)
    }

    pub fn slot(&self, role: ChannelRole) -> Option<&ChannelSlot> {
        self.slots.get(&role)
    }

    pub(crate) fn slot_mut(&mut self, role: ChannelRole) -> Option<&mut ChannelSlot> {
        self.slots.get_mut(&role)
    }

    pub(crate) fn insert_slot(&mut self, role: ChannelRole, slot: ChannelSlot) {
        self.slots.insert(role, slot);
    }

    pub fn roles(&self) -> impl Iterator<Item = ChannelRole> + '_ {
        self.slots.keys().copied()
    }

    pub fn buffer_count(&self) -> usize {
        self.slots.len()
    }

    /// True when no slot holds any sample.
    pub fn is_empty(&self) -> bool {
        self.slots.values().all(|slot| slot.buffer.is_empty())
    }

    /// Non-empty slot that went longest without an update.
    pub(crate) fn stalest_nonempty_slot_mut(&mut self) -> Option<(ChannelRole, &mut ChannelSlot)> {
        self.slots
            .iter_mut()
            .filter(|(_, slot)| !slot.buffer.is_empty())
            .min_by_key(|(_, slot)| slot.last_update_pulse)
            .map(|(role, slot)| (*role, slot))
    }
}
