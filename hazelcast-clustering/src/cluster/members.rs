//! Cluster membership snapshots.

use std::collections::HashMap;
use std::net::SocketAddr;

use uuid::Uuid;

/// Version of the codebase a member runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MemberVersion {
    /// Major version.
    pub major: u8,
    /// Minor version.
    pub minor: u8,
    /// Patch version.
    pub patch: u8,
}

impl MemberVersion {
    /// Creates a member version.
    pub fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self { major, minor, patch }
    }
}

impl std::fmt::Display for MemberVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A member of the cluster as described by a member view.
///
/// Two `MemberInfo` values are equal when they describe the same member id,
/// whatever their other fields.
#[derive(Debug, Clone)]
pub struct MemberInfo {
    id: Uuid,
    address: SocketAddr,
    attributes: HashMap<String, String>,
    lite_member: bool,
    version: MemberVersion,
}

impl MemberInfo {
    /// Creates a data member without attributes.
    pub fn new(id: Uuid, address: SocketAddr) -> Self {
        Self {
            id,
            address,
            attributes: HashMap::new(),
            lite_member: false,
            version: MemberVersion::default(),
        }
    }

    /// Sets the member attributes.
    pub fn with_attributes(mut self, attributes: HashMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Marks the member as a lite member.
    pub fn with_lite_member(mut self, lite_member: bool) -> Self {
        self.lite_member = lite_member;
        self
    }

    /// Sets the member version.
    pub fn with_version(mut self, version: MemberVersion) -> Self {
        self.version = version;
        self
    }

    /// Returns the member's unique id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the member's address.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Returns the member's attributes.
    pub fn attributes(&self) -> &HashMap<String, String> {
        &self.attributes
    }

    /// Returns whether the member stores no data.
    pub fn is_lite_member(&self) -> bool {
        self.lite_member
    }

    /// Returns the member's codebase version.
    pub fn version(&self) -> MemberVersion {
        self.version
    }
}

impl PartialEq for MemberInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MemberInfo {}

impl std::hash::Hash for MemberInfo {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Display for MemberInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Member[{}]:{}", self.address, self.id)?;
        if self.lite_member {
            write!(f, " lite")?;
        }
        Ok(())
    }
}

/// Immutable membership snapshot at one topology version.
#[derive(Debug, Clone)]
pub struct MemberTable {
    version: i32,
    members: HashMap<Uuid, MemberInfo>,
}

impl MemberTable {
    /// Creates a table from a member view.
    pub fn new(version: i32, members: impl IntoIterator<Item = MemberInfo>) -> Self {
        Self {
            version,
            members: members.into_iter().map(|m| (m.id(), m)).collect(),
        }
    }

    /// The table before any member view has been received.
    pub fn empty() -> Self {
        Self {
            version: -1,
            members: HashMap::new(),
        }
    }

    /// Returns the topology version.
    pub fn version(&self) -> i32 {
        self.version
    }

    /// Returns the member with the given id.
    pub fn get(&self, id: &Uuid) -> Option<&MemberInfo> {
        self.members.get(id)
    }

    /// Returns true if the member is part of this snapshot.
    pub fn contains(&self, id: &Uuid) -> bool {
        self.members.contains_key(id)
    }

    /// Iterates over the members in no particular order.
    pub fn members(&self) -> impl Iterator<Item = &MemberInfo> {
        self.members.values()
    }

    /// Returns the member ids.
    pub fn member_ids(&self) -> Vec<Uuid> {
        self.members.keys().copied().collect()
    }

    /// Returns the number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if the snapshot has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl Default for MemberTable {
    fn default() -> Self {
        Self::empty()
    }
}

/// Difference between two membership snapshots.
#[derive(Debug, Clone, Default)]
pub struct MemberDiff {
    /// Members only present in the new snapshot.
    pub added: Vec<MemberInfo>,
    /// Members only present in the old snapshot.
    pub removed: Vec<MemberInfo>,
    /// Members present in both snapshots.
    pub unchanged: Vec<MemberInfo>,
}

impl MemberDiff {
    /// Compares two snapshots.
    ///
    /// Members of `old` weigh 1 and members of `new` weigh 2, so the summed
    /// weight tells removed (1), added (2) and unchanged (3) apart.
    pub fn between(old: &MemberTable, new: &MemberTable) -> Self {
        let mut weights: HashMap<Uuid, (u8, &MemberInfo)> = HashMap::new();
        for member in old.members() {
            weights.insert(member.id(), (1, member));
        }
        for member in new.members() {
            weights
                .entry(member.id())
                .and_modify(|(weight, info)| {
                    *weight += 2;
                    *info = member;
                })
                .or_insert((2, member));
        }

        let mut diff = Self::default();
        for (weight, member) in weights.into_values() {
            match weight {
                1 => diff.removed.push(member.clone()),
                2 => diff.added.push(member.clone()),
                _ => diff.unchanged.push(member.clone()),
            }
        }
        diff
    }

    /// Returns true if membership did not change.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}
