pub mod states;
pub mod params;
pub mod forces;
pub mod post_newtonian;
pub mod oblateness;
pub mod geodesic;
pub mod integrator;
pub mod events;
pub mod snapshot;
pub mod engine;
pub mod orbits;
pub mod scenario;
