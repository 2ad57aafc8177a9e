//! Cross-provider rotation over a group's ordered entries.

use crate::exhaustion::ExhaustionRegistry;
use crate::host::ModelLookup;
use rotakey_config::{EndpointEntry, Group};
use rotakey_types::{EndpointRef, ModelDescriptor};

/// A group entry that survived every availability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Index of the entry within its group.
    pub position: usize,
    pub entry: EndpointEntry,
    pub endpoint: EndpointRef,
    pub model: ModelDescriptor,
}

/// Index of the entry matching the current model: an exact `"provider/model"`
/// entry first, otherwise the first entry naming the same provider.
#[must_use]
pub fn current_position(group: &Group, current: Option<&ModelDescriptor>) -> Option<usize> {
    let current = current?;
    let exact = current.endpoint_id();
    group
        .entries
        .iter()
        .position(|e| e.id.trim() == exact)
        .or_else(|| {
            group.entries.iter().position(|e| {
                e.endpoint()
                    .is_ok_and(|ep| ep.provider == current.provider)
            })
        })
}

/// Entry indices in rotation order: starting after `current` (or at the first
/// entry), wrapping around, each index exactly once.
fn scan_order(len: usize, current: Option<usize>) -> impl Iterator<Item = usize> {
    let start = current.map_or(0, |i| i + 1);
    (0..len).map(move |step| (start + step) % len)
}

/// Check one entry: parseable, not in cooldown, a model resolves, and that
/// model has a usable credential.
async fn resolve_entry<L: ModelLookup + ?Sized>(
    position: usize,
    entry: &EndpointEntry,
    registry: &mut ExhaustionRegistry,
    lookup: &L,
) -> Option<Candidate> {
    let endpoint = match entry.endpoint() {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!(entry = %entry.id, error = %e, "skipping malformed group entry");
            return None;
        }
    };
    if registry.is_exhausted(&endpoint.id()) {
        tracing::debug!(entry = %endpoint, "skipping exhausted entry");
        return None;
    }

    let models = lookup.list_available_models(&endpoint.provider).await;
    let model = match &endpoint.model {
        Some(id) => models.into_iter().find(|m| &m.id == id),
        None => models.into_iter().next(),
    };
    let Some(model) = model else {
        tracing::debug!(entry = %endpoint, "no model available for entry");
        return None;
    };
    if lookup.credential_for_model(&model).await.is_none() {
        tracing::debug!(entry = %endpoint, model = %model.id, "no usable credential for entry");
        return None;
    }

    Some(Candidate {
        position,
        entry: entry.clone(),
        endpoint,
        model,
    })
}

/// Walks a group in rotation order, yielding usable candidates.
///
/// Starts after the entry matching the current model and visits each entry at
/// most once, so it terminates even when nothing in the group is usable. A
/// caller whose candidate is rejected downstream asks for the next one.
#[derive(Debug)]
pub struct EndpointScan<'a> {
    group: &'a Group,
    order: std::vec::IntoIter<usize>,
}

impl<'a> EndpointScan<'a> {
    #[must_use]
    pub fn new(group: &'a Group, current: Option<&ModelDescriptor>) -> Self {
        let position = current_position(group, current);
        let order: Vec<usize> = scan_order(group.entries.len(), position).collect();
        Self {
            group,
            order: order.into_iter(),
        }
    }

    /// The next usable candidate, or `None` once every entry was visited.
    pub async fn next_candidate<L: ModelLookup + ?Sized>(
        &mut self,
        registry: &mut ExhaustionRegistry,
        lookup: &L,
    ) -> Option<Candidate> {
        for index in self.order.by_ref() {
            if let Some(candidate) =
                resolve_entry(index, &self.group.entries[index], registry, lookup).await
            {
                return Some(candidate);
            }
        }
        None
    }
}
