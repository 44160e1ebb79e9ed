pub mod error;
pub mod simulation;
pub mod configuration;
pub mod benchmark;

pub use error::{Result, SimError};

pub use simulation::states::{Body, BodyId, IntegrationGroup, SystemState, Tracer, Vector, NVec2, NVec3};
pub use simulation::params::Parameters;
pub use simulation::forces::{ForceModel, ForceSet, NewtonianPairwise};
pub use simulation::post_newtonian::{PostNewtonianBinary, quasi_circular};
pub use simulation::oblateness::OblatenessPerturbation;
pub use simulation::geodesic::{GeodesicField, GeodesicTracer, ParticleKind};
pub use simulation::integrator::{Integrator, StepOutcome, StepSizes, ExplicitEuler, VelocityVerlet, ClassicalRk4, Yoshida4};
pub use simulation::events::{Phase, TerminationReason, MergerDetector, MergerConfig, EjectaConfig, EventProgress};
pub use simulation::snapshot::{Snapshot, BodySnapshot};
pub use simulation::engine::{Simulation, TickStatus, Diagnostics};
pub use simulation::scenario::Scenario;

pub use configuration::config::{IntegratorKind, EngineConfig, ParametersConfig, BodyConfig, ScenarioConfig};

pub use benchmark::benchmark::{bench_integrators, bench_gravity};
