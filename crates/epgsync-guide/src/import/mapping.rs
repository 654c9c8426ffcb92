//! Feed channel id to local channel mapping.

use std::collections::{BTreeMap, HashMap};

use super::store::{LocalChannel, Program};

/// Lookup from XMLTV channel id to the local channels mapped to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelMapping {
    by_external_id: BTreeMap<String, Vec<LocalChannel>>,
}

impl ChannelMapping {
    /// Builds the mapping from channels carrying an external id.
    ///
    /// Channels without an external id are ignored. A local channel
    /// listed twice under the same id appears once.
    #[must_use]
    pub fn build(channels: Vec<LocalChannel>) -> Self {
        let mut mapped: Vec<LocalChannel> = channels
            .into_iter()
            .filter(|c| c.external_id.as_deref().is_some_and(|id| !id.is_empty()))
            .collect();
        mapped.sort_by(|a, b| a.external_id.cmp(&b.external_id));

        let mut by_external_id = BTreeMap::new();
        for group in mapped.chunk_by(|a, b| a.external_id == b.external_id) {
            let Some(external_id) = group.first().and_then(|c| c.external_id.clone()) else {
                continue;
            };
            let mut members: Vec<LocalChannel> = Vec::with_capacity(group.len());
            for channel in group {
                if !members.iter().any(|m| m.id == channel.id) {
                    members.push(channel.clone());
                }
            }
            by_external_id.insert(external_id, members);
        }

        Self { by_external_id }
    }

    /// Local channels mapped to `external_id` (empty if none).
    #[must_use]
    pub fn channels_for(&self, external_id: &str) -> &[LocalChannel] {
        self.by_external_id
            .get(external_id)
            .map_or(&[], Vec::as_slice)
    }

    /// Returns `true` if no channel is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_external_id.is_empty()
    }

    /// Number of distinct external ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_external_id.len()
    }
}

/// Programs collected for one local channel during an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelBundle {
    /// Local channel id.
    pub channel_id: u32,
    /// Local channel name.
    pub name: String,
    /// Feed channel id that produced the bundle.
    pub external_id: String,
    /// Collected programs, in feed order.
    pub programs: Vec<Program>,
}

/// Bundles keyed by local channel id, in creation order.
#[derive(Debug, Clone, Default)]
pub struct BundleSet {
    bundles: Vec<ChannelBundle>,
    index: HashMap<u32, usize>,
}

impl BundleSet {
    /// Creates a bundle for `channel` unless one exists.
    ///
    /// Returns `true` if a bundle was created.
    pub fn insert(&mut self, channel: &LocalChannel, external_id: &str) -> bool {
        if self.index.contains_key(&channel.id) {
            return false;
        }
        self.index.insert(channel.id, self.bundles.len());
        self.bundles.push(ChannelBundle {
            channel_id: channel.id,
            name: channel.name.clone(),
            external_id: external_id.to_owned(),
            programs: Vec::new(),
        });
        true
    }

    /// Appends a program to the bundle of `channel`, creating it if needed.
    pub fn push(&mut self, channel: &LocalChannel, external_id: &str, program: Program) {
        self.insert(channel, external_id);
        if let Some(bundle) = self
            .index
            .get(&channel.id)
            .and_then(|&i| self.bundles.get_mut(i))
        {
            bundle.programs.push(program);
        }
    }

    /// Number of bundles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    /// Returns `true` if there are no bundles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    /// Consumes the set, yielding bundles in creation order.
    #[must_use]
    pub fn into_bundles(self) -> Vec<ChannelBundle> {
        self.bundles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(id: u32, name: &str, external_id: Option<&str>) -> LocalChannel {
        LocalChannel {
            id,
            name: name.to_owned(),
            external_id: external_id.map(str::to_owned),
        }
    }

    #[test]
    fn test_build_groups_by_external_id() {
        // Arrange
        let channels = vec![
            channel(20, "Two", Some("c1")),
            channel(30, "Three", Some("c2")),
            channel(10, "One", Some("c1")),
            channel(40, "Four", None),
            channel(50, "Five", Some("")),
        ];

        // Act
        let mapping = ChannelMapping::build(channels);

        // Assert
        assert_eq!(mapping.len(), 2);
        let ids: Vec<u32> = mapping.channels_for("c1").iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![20, 10]);
        assert_eq!(mapping.channels_for("c2").len(), 1);
        assert!(mapping.channels_for("missing").is_empty());
    }

    #[test]
    fn test_build_deduplicates_local_channels() {
        // Arrange
        let channels = vec![
            channel(10, "One", Some("c1")),
            channel(10, "One", Some("c1")),
        ];

        // Act
        let mapping = ChannelMapping::build(channels);

        // Assert
        assert_eq!(mapping.channels_for("c1").len(), 1);
    }

    #[test]
    fn test_build_empty() {
        // Arrange & Act
        let mapping = ChannelMapping::build(vec![channel(1, "x", None)]);

        // Assert
        assert!(mapping.is_empty());
    }

    #[test]
    fn test_bundle_first_creation_wins() {
        // Arrange
        let mut set = BundleSet::default();
        let ch = channel(10, "One", Some("c1"));

        // Act
        let first = set.insert(&ch, "c1");
        let second = set.insert(&ch, "c9");

        // Assert
        assert!(first);
        assert!(!second);
        let bundles = set.into_bundles();
        assert_eq!(bundles.len(), 1);
        assert_eq!(bundles[0].external_id, "c1");
    }

    #[test]
    fn test_bundle_keeps_creation_order() {
        // Arrange
        let mut set = BundleSet::default();

        // Act
        set.insert(&channel(30, "Three", None), "b");
        set.insert(&channel(10, "One", None), "a");

        // Assert
        let ids: Vec<u32> = set.into_bundles().iter().map(|b| b.channel_id).collect();
        assert_eq!(ids, vec![30, 10]);
    }
}
