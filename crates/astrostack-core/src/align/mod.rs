pub mod aligner;
pub mod ap_grid;
pub mod asterism;
pub mod combinations;
pub mod comet;
pub mod local_shifts;
pub mod phase_correlation;
pub mod planetary;
pub mod plate_solver;
pub mod result;
pub mod star_aligner;
pub mod transform;

pub use aligner::FrameAligner;
pub use ap_grid::{align_surface, SurfaceAligner, SurfaceAlignmentConfig};
pub use asterism::{calculate_asterism_hash, AsterismHash};
pub use comet::{CometAligner, CometObservation, CometPath};
pub use local_shifts::{LocalShift, LocalShiftsHandler, ShiftLookup};
pub use planetary::{find_disk, Disk, PlanetaryAligner, PlanetaryAlignmentConfig};
pub use plate_solver::{PlateSolver, PlateSolverConfig};
pub use result::AlignmentResult;
pub use star_aligner::{StarAligner, StarDetectionConfig};
pub use transform::GeometricTransformer;
