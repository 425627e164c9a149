/// The five system snapshots the cache serves, and the object-store path
/// each is backed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotKind {
    Apps,
    Users,
    Organizations,
    Blocked,
    Dunning,
}

impl SnapshotKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotKind::Apps => "apps",
            SnapshotKind::Users => "users",
            SnapshotKind::Organizations => "organizations",
            SnapshotKind::Blocked => "blocked",
            SnapshotKind::Dunning => "dunning",
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            SnapshotKind::Apps => "system://apps.json",
            SnapshotKind::Users => "system://users.json",
            SnapshotKind::Organizations => "system://organizations.json",
            SnapshotKind::Blocked => "system://blocked.json",
            SnapshotKind::Dunning => "system://dunning.json",
        }
    }

    pub fn all() -> [SnapshotKind; 5] {
        [
            SnapshotKind::Apps,
            SnapshotKind::Users,
            SnapshotKind::Organizations,
            SnapshotKind::Blocked,
            SnapshotKind::Dunning,
        ]
    }
}
