//! Capturable data planes and channel masks.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the three data planes a device can stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Color,
    Depth,
    Infrared,
}

impl Channel {
    /// All channels in canonical order
    pub const ALL: [Channel; 3] = [Channel::Color, Channel::Depth, Channel::Infrared];

    #[inline]
    const fn bit(self) -> u8 {
        match self {
            Channel::Color => 0b001,
            Channel::Depth => 0b010,
            Channel::Infrared => 0b100,
        }
    }

    /// Slot in fixed-size per-channel arrays
    #[inline]
    pub const fn slot(self) -> usize {
        match self {
            Channel::Color => 0,
            Channel::Depth => 1,
            Channel::Infrared => 2,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Channel::Color => "color",
            Channel::Depth => "depth",
            Channel::Infrared => "infrared",
        })
    }
}

/// Set of channels, stored as a bit mask
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ChannelSet(u8);

impl ChannelSet {
    /// No channels
    pub const EMPTY: ChannelSet = ChannelSet(0);

    /// Color + depth + infrared
    pub const ALL: ChannelSet = ChannelSet(0b111);

    /// Mask with a single channel
    pub const fn only(channel: Channel) -> Self {
        Self(channel.bit())
    }

    /// Add a channel
    pub const fn with(self, channel: Channel) -> Self {
        Self(self.0 | channel.bit())
    }

    #[inline]
    pub fn insert(&mut self, channel: Channel) {
        self.0 |= channel.bit();
    }

    #[inline]
    pub fn remove(&mut self, channel: Channel) {
        self.0 &= !channel.bit();
    }

    #[inline]
    pub const fn contains(self, channel: Channel) -> bool {
        self.0 & channel.bit() != 0
    }

    /// True if every channel of `other` is in `self`
    #[inline]
    pub const fn is_superset(self, other: ChannelSet) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Channels in canonical order
    pub fn iter(self) -> impl Iterator<Item = Channel> {
        Channel::ALL.into_iter().filter(move |c| self.contains(*c))
    }

    /// Channels of `self` that are not in `other`
    pub fn difference(self, other: ChannelSet) -> ChannelSet {
        ChannelSet(self.0 & !other.0)
    }
}

impl FromIterator<Channel> for ChannelSet {
    fn from_iter<I: IntoIterator<Item = Channel>>(iter: I) -> Self {
        iter.into_iter()
            .fold(ChannelSet::EMPTY, |set, channel| set.with(channel))
    }
}

impl From<&[Channel]> for ChannelSet {
    fn from(channels: &[Channel]) -> Self {
        channels.iter().copied().collect()
    }
}

impl fmt::Debug for ChannelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for ChannelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.iter().map(|c| c.to_string()).collect();
        write!(f, "{{{}}}", names.join(","))
    }
}

impl Serialize for ChannelSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for ChannelSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let channels = Vec::<Channel>::deserialize(deserializer)?;
        Ok(channels.into_iter().collect())
    }
}
