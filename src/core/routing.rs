//! Routing oracle contract and the geometry the candidate search needs.
//!
//! The pathfinding service itself lives outside this crate; the search only
//! depends on the request/response shape defined here.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A known location in a region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Location symbol.
    pub symbol: String,
    /// X coordinate.
    pub x: i64,
    /// Y coordinate.
    pub y: i64,
    /// Traits such as the class of extractable resource.
    pub traits: Vec<String>,
    /// Whether fuel can be bought here.
    pub sells_fuel: bool,
    /// Whether cargo can be sold here, making it a valid destination.
    pub is_market: bool,
}

impl Location {
    /// Create a location with no traits, no fuel and no market.
    pub fn new(symbol: impl Into<String>, x: i64, y: i64) -> Self {
        Self {
            symbol: symbol.into(),
            x,
            y,
            traits: Vec::new(),
            sells_fuel: false,
            is_market: false,
        }
    }

    /// Add a trait.
    #[must_use]
    pub fn with_trait(mut self, trait_name: impl Into<String>) -> Self {
        self.traits.push(trait_name.into());
        self
    }

    /// Mark as a market, optionally selling fuel.
    #[must_use]
    pub const fn as_market(mut self, sells_fuel: bool) -> Self {
        self.is_market = true;
        self.sells_fuel = sells_fuel;
        self
    }

    /// Whether the location carries `trait_name`.
    #[must_use]
    pub fn has_trait(&self, trait_name: &str) -> bool {
        self.traits.iter().any(|t| t == trait_name)
    }

    /// Euclidean distance to another location.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn distance_to(&self, other: &Self) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dy = (self.y - other.y) as f64;
        dx.hypot(dy)
    }
}

/// Fuel and speed of the ship an operation is planned around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipProfile {
    /// Fuel tank capacity.
    pub fuel_capacity: u32,
    /// Fuel currently aboard.
    pub current_fuel: u32,
    /// Engine speed.
    pub speed: u32,
}

impl ShipProfile {
    /// A profile with a full tank.
    #[must_use]
    pub const fn full(fuel_capacity: u32, speed: u32) -> Self {
        Self {
            fuel_capacity,
            current_fuel: fuel_capacity,
            speed,
        }
    }
}

/// Travel mode trading fuel for time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlightMode {
    /// Balanced fuel and time.
    Cruise,
    /// Minimal fuel, very slow.
    Drift,
    /// Double fuel, fast.
    Burn,
}

impl FlightMode {
    /// Estimated fuel to cover `distance`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn fuel_cost(self, distance: f64) -> u32 {
        let d = distance.max(0.0).round() as u32;
        match self {
            Self::Cruise => d.max(1),
            Self::Drift => 1,
            Self::Burn => d.saturating_mul(2).max(2),
        }
    }

    /// Estimated seconds to cover `distance` at `speed`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn travel_time(self, distance: f64, speed: u32) -> u32 {
        let multiplier = match self {
            Self::Cruise => 25.0,
            Self::Drift => 250.0,
            Self::Burn => 12.5,
        };
        let speed = f64::from(speed.max(1));
        (distance.max(1.0).round() * (multiplier / speed) + 15.0).round() as u32
    }
}

/// A path-planning request.
#[derive(Debug, Clone, Copy)]
pub struct RouteRequest<'a> {
    /// Start location symbol.
    pub start: &'a str,
    /// Goal location symbol.
    pub goal: &'a str,
    /// Fuel aboard at the start.
    pub current_fuel: u32,
    /// Fuel tank capacity.
    pub fuel_capacity: u32,
    /// Engine speed.
    pub speed: u32,
    /// Known locations with coordinates and fuel availability.
    pub locations: &'a [Location],
}

/// One travel or refuel step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStep {
    /// Step origin.
    pub from: String,
    /// Step destination.
    pub to: String,
    /// Travel mode.
    pub mode: FlightMode,
    /// Fuel consumed by the step.
    pub fuel_cost: u32,
    /// Seconds taken by the step.
    pub travel_time: u32,
    /// Whether the ship refuels at `to`.
    pub refuel: bool,
}

/// Ordered steps from start to goal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutePlan {
    /// Steps in travel order.
    pub steps: Vec<RouteStep>,
}

impl RoutePlan {
    /// Fuel consumed across all steps.
    #[must_use]
    pub fn total_fuel(&self) -> u32 {
        self.steps.iter().map(|s| s.fuel_cost).sum()
    }

    /// Seconds taken across all steps.
    #[must_use]
    pub fn total_time(&self) -> u32 {
        self.steps.iter().map(|s| s.travel_time).sum()
    }
}

/// Failures reported by a routing oracle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    /// The oracle could not be reached.
    #[error("routing oracle unavailable: {0}")]
    Unavailable(String),
    /// The oracle rejected the request.
    #[error("invalid route request: {0}")]
    InvalidRequest(String),
}

/// External path planner. `Ok(None)` means no path exists.
pub trait RoutingOracle: Send + Sync {
    /// Plan a route for the request.
    ///
    /// # Errors
    ///
    /// Returns a [`RoutingError`] if the oracle fails; callers in this crate
    /// treat that as "no usable route".
    fn plan_route(&self, request: &RouteRequest<'_>) -> Result<Option<RoutePlan>, RoutingError>;

    /// Most fuel-frugal mode this oracle may put in a plan. The candidate
    /// search estimates with it, so its pre-filter never skips a pair the
    /// oracle could route within capacity.
    fn cheapest_mode(&self) -> FlightMode {
        FlightMode::Cruise
    }
}

/// Oracle that flies straight to the goal in cruise mode, falling back to
/// drift when cruise fuel is not aboard.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectRouteOracle;

impl RoutingOracle for DirectRouteOracle {
    fn plan_route(&self, request: &RouteRequest<'_>) -> Result<Option<RoutePlan>, RoutingError> {
        let find = |symbol: &str| {
            request
                .locations
                .iter()
                .find(|l| l.symbol == symbol)
                .ok_or_else(|| RoutingError::InvalidRequest(format!("unknown location {symbol}")))
        };
        let start = find(request.start)?;
        let goal = find(request.goal)?;
        let distance = start.distance_to(goal);

        let mode = [FlightMode::Cruise, FlightMode::Drift]
            .into_iter()
            .find(|m| m.fuel_cost(distance) <= request.current_fuel);
        Ok(mode.map(|mode| RoutePlan {
            steps: vec![RouteStep {
                from: start.symbol.clone(),
                to: goal.symbol.clone(),
                mode,
                fuel_cost: mode.fuel_cost(distance),
                travel_time: mode.travel_time(distance, request.speed),
                refuel: goal.sells_fuel,
            }],
        }))
    }

    fn cheapest_mode(&self) -> FlightMode {
        FlightMode::Drift
    }
}
