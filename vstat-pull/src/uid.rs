use hashbrown::HashMap;
use indexmap::IndexMap;
use indexmap::map::Entry;
use parking_lot::RwLock;
use vstat_common::{FieldValue, Sample};

use crate::PullSpec;

/// Maps isolated process UIDs to the UID of the app hosting them.
///
/// Implementations are shared by all caches of a process and must be safe for concurrent reads.
pub trait UidRemapper: Send + Sync {
    /// Returns the host UID of `uid`, or `uid` itself if it is not an isolated UID.
    fn to_host_uid(&self, uid: i32) -> i32;
}

/// A mutable table of isolated UIDs and their hosts.
///
/// The empty table maps every UID to itself.
#[derive(Debug, Default)]
pub struct IsolatedUidMap {
    hosts: RwLock<HashMap<i32, i32>>,
}

impl IsolatedUidMap {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `isolated` runs on behalf of `host`.
    pub fn insert(&self, isolated: i32, host: i32) {
        self.hosts.write().insert(isolated, host);
    }

    /// Forgets the isolated UID `isolated`.
    pub fn remove(&self, isolated: i32) {
        self.hosts.write().remove(&isolated);
    }

    /// Forgets all isolated UIDs hosted by `host`.
    pub fn remove_host(&self, host: i32) {
        self.hosts.write().retain(|_, h| *h != host);
    }
}

impl UidRemapper for IsolatedUidMap {
    fn to_host_uid(&self, uid: i32) -> i32 {
        self.hosts.read().get(&uid).copied().unwrap_or(uid)
    }
}

/// Remaps the UID field of every sample and merges samples that collide afterwards.
///
/// Samples are only merged when `spec` declares additive fields. Two samples collide if all of
/// their other fields are equal, in which case the additive fields of the later sample are added to
/// the first one. The order of first occurrences is preserved.
pub fn map_and_merge_isolated_uids(
    mut samples: Vec<Sample>,
    spec: &PullSpec,
    remapper: &dyn UidRemapper,
) -> Vec<Sample> {
    let Some(uid_field) = spec.uid_field else {
        return samples;
    };

    for sample in &mut samples {
        if let Some(FieldValue::Int(uid)) = sample.field_mut(uid_field) {
            if let Ok(isolated) = i32::try_from(*uid) {
                *uid = i64::from(remapper.to_host_uid(isolated));
            }
        }
    }

    if spec.additive_fields.is_empty() {
        return samples;
    }

    let mut merged = IndexMap::<Vec<FieldValue>, Sample>::with_capacity(samples.len());
    for sample in samples {
        let key = sample
            .fields
            .iter()
            .enumerate()
            .filter(|(i, _)| !spec.additive_fields.contains(&(i + 1)))
            .map(|(_, field)| field.clone())
            .collect();

        match merged.entry(key) {
            Entry::Occupied(mut entry) => {
                let target = entry.get_mut();
                for &position in &spec.additive_fields {
                    if let (Some(into), Some(from)) =
                        (target.field_mut(position), sample.field(position))
                    {
                        into.add_assign(from);
                    }
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(sample);
            }
        }
    }

    merged.into_values().collect()
}
