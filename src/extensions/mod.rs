//! Built-in extension units, selectable by `kind` in `[[extensions.units]]`

pub mod room_conference;
pub mod static_route;

pub use room_conference::{RoomConference, RoomConferenceSettings};
pub use static_route::{RouteRule, RuleAction, StaticRoute, StaticRouteSettings};

use crate::domain::extension::{ExtensionUnit, UnitCatalog};
use std::sync::Arc;

/// Catalog of every unit kind shipped with this crate
pub fn builtin_catalog() -> UnitCatalog {
    let mut catalog = UnitCatalog::new();
    catalog
        .register("static_route", |config| {
            let unit: Arc<dyn ExtensionUnit> = Arc::new(StaticRoute::from_config(config)?);
            Ok(unit)
        })
        .register("room_conference", |config| {
            let unit: Arc<dyn ExtensionUnit> = Arc::new(RoomConference::from_config(config)?);
            Ok(unit)
        });
    catalog
}
