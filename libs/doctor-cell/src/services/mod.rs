pub mod doctor;
pub mod availability;
pub mod slots;

pub use doctor::DoctorService;
pub use availability::AvailabilityService;
pub use slots::SlotService;
