pub mod booking;
pub mod conflict;
pub mod directory;
pub mod lifecycle;
pub mod tokens;

pub use booking::AppointmentBookingService;
pub use conflict::ConflictDetectionService;
pub use directory::PatientDirectoryService;
pub use lifecycle::AppointmentLifecycleService;
pub use tokens::{CheckInTokenService, CounterSequence, SequenceSource};
