use dashmap::DashMap;

/// Process-wide `short_device_id -> imei` mapping populated by `LG` logins
/// (§4.3 "Session state held by C", §9 "shared alias map").
///
/// Backed by `DashMap` rather than a single `RwLock<HashMap<_>>`: reads
/// (every subsequent frame on an established connection) outnumber writes
/// (one per login) by roughly 1000:1, and a sharded concurrent map avoids
/// funneling every read through one lock.
#[derive(Debug, Default)]
pub struct AliasMap {
    inner: DashMap<u32, String>,
}

impl AliasMap {
    pub fn new() -> Self {
        AliasMap {
            inner: DashMap::new(),
        }
    }

    pub fn insert(&self, short_device_id: u32, imei: impl Into<String>) {
        self.inner.insert(short_device_id, imei.into());
    }

    pub fn get(&self, short_device_id: u32) -> Option<String> {
        self.inner.get(&short_device_id).map(|entry| entry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_imei_after_insert() {
        let map = AliasMap::new();
        map.insert(100, "867762040399039");
        assert_eq!(map.get(100).as_deref(), Some("867762040399039"));
    }

    #[test]
    fn unknown_alias_is_none() {
        let map = AliasMap::new();
        assert_eq!(map.get(999), None);
    }
}
