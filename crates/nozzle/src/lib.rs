//! Event routing and the firehose dispatcher.

pub mod dispatcher;
pub mod fields;
pub mod router;

pub use dispatcher::{Nozzle, NozzleConfig};
pub use router::{
    parse_extra_fields, parse_ownership_fields, OwnershipField, Route, Router, RouterConfig,
};
