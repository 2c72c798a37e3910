//! Registry of the channels a sensor exposes.
//!
//! Registration order is column order in the packets the sensor emits. A
//! channel can be registered once; a second registration is rejected with
//! [`CranioError::DuplicateChannel`] and leaves the registry unchanged.

use crate::error::{CranioError, Result};
use crate::types::ChannelInfo;

/// Ordered set of registered channels
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelRegistry {
    channels: Vec<ChannelInfo>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel, rejecting duplicates
    pub fn register(&mut self, info: ChannelInfo) -> Result<()> {
        if self.contains(&info) {
            return Err(CranioError::DuplicateChannel(info.to_string()));
        }
        tracing::debug!("Registered channel {}", info);
        self.channels.push(info);
        Ok(())
    }

    /// Remove a channel, returning whether it was registered
    pub fn unregister(&mut self, info: &ChannelInfo) -> bool {
        let len_before = self.channels.len();
        self.channels.retain(|c| c != info);
        self.channels.len() < len_before
    }

    pub fn contains(&self, info: &ChannelInfo) -> bool {
        self.channels.contains(info)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelInfo> {
        self.channels.iter()
    }

    /// Registered channels in registration order
    pub fn to_vec(&self) -> Vec<ChannelInfo> {
        self.channels.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_keeps_order() {
        let mut registry = ChannelRegistry::new();
        registry.register(ChannelInfo::new("torque", "Nm")).unwrap();
        registry.register(ChannelInfo::new("force", "N")).unwrap();

        let names: Vec<String> = registry.iter().map(|c| c.to_string()).collect();
        assert_eq!(names, vec!["torque (Nm)", "force (N)"]);
    }

    #[test]
    fn test_duplicate_is_rejected_and_first_wins() {
        let mut registry = ChannelRegistry::new();
        registry.register(ChannelInfo::new("torque", "Nm")).unwrap();
        let err = registry.register(ChannelInfo::new("torque", "Nm")).unwrap_err();

        assert!(matches!(err, CranioError::DuplicateChannel(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_same_name_different_unit_is_distinct() {
        let mut registry = ChannelRegistry::new();
        registry.register(ChannelInfo::new("torque", "Nm")).unwrap();
        registry.register(ChannelInfo::new("torque", "Ncm")).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unregister() {
        let mut registry = ChannelRegistry::new();
        let info = ChannelInfo::new("torque", "Nm");
        registry.register(info.clone()).unwrap();

        assert!(registry.unregister(&info));
        assert!(!registry.unregister(&info));
        assert!(registry.is_empty());
    }
}
