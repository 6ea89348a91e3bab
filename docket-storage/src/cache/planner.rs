//! Filter evaluation over the secondary indexes.
//!
//! Predicates are resolved in a fixed order: status, owner, creation time,
//! update time. The first present predicate seeds the candidate set; every
//! later one keeps only the candidates it also yields. Surviving ids are then
//! decoded through the primary map.
//!
//! The whole evaluation runs against one read guard, so the result reflects a
//! single consistent cache state.

use docket_core::{
    Application, ApplicationFilter, ApplicationId, ApplicationStatus, DocketResult, StorageError,
    TimeRange, UserId, ValidationError,
};

use super::indexed::{CacheTables, IdSet};

/// One resolvable filter predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    Status(ApplicationStatus),
    Owner(UserId),
    CreatedAt(TimeRange),
    UpdatedAt(TimeRange),
}

/// Present predicates of `filter`, in evaluation order.
pub fn predicates(filter: &ApplicationFilter) -> Vec<Predicate> {
    [
        filter.status.map(Predicate::Status),
        filter.owner.map(Predicate::Owner),
        filter.created_at.map(Predicate::CreatedAt),
        filter.updated_at.map(Predicate::UpdatedAt),
    ]
    .into_iter()
    .flatten()
    .collect()
}

pub(crate) fn execute(
    tables: &CacheTables,
    filter: &ApplicationFilter,
) -> DocketResult<Vec<Application>> {
    let steps = predicates(filter);
    if steps.is_empty() {
        return Err(ValidationError::EmptyFilter.into());
    }

    let mut candidates: Option<IdSet> = None;
    for step in steps {
        let narrowed = match step {
            Predicate::Status(status) => narrow(candidates, tables.ids_with_status(status)),
            Predicate::Owner(owner) => narrow(candidates, tables.ids_with_owner(owner)),
            Predicate::CreatedAt(range) => narrow(candidates, tables.ids_created_in(range)),
            Predicate::UpdatedAt(range) => narrow(candidates, tables.ids_updated_in(range)),
        };
        if narrowed.is_empty() {
            return Ok(Vec::new());
        }
        candidates = Some(narrowed);
    }

    candidates
        .unwrap_or_default()
        .into_iter()
        .map(|id| {
            tables
                .decode(id)?
                .ok_or(StorageError::IndexInconsistent { id: id.as_uuid() })
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(Into::into)
}

fn narrow(current: Option<IdSet>, found: impl Iterator<Item = ApplicationId>) -> IdSet {
    match current {
        None => found.collect(),
        Some(running) => found.filter(|id| running.contains(id)).collect(),
    }
}
