//! Event model, connectivity grouping and contact parameter lookup.

pub mod event;
pub mod grouping;
pub mod parameters;
pub mod tolerances;

pub use event::{sort_by_time, ConstraintData, ContactData, Event, EventClass, EventKind, LimitData};
pub use grouping::{reduce_minimal_set, remove_nonimpacting_groups, EventGroup, EventGrouper};
pub use parameters::{ContactParameterTable, ContactParameters, FrictionEdges, ParamKey, ParamSubject};
pub use tolerances::{EventKey, EventTolerances};
