pub mod availability;
pub mod block;
pub mod template;

pub use availability::AvailabilityService;
pub use block::BlockService;
pub use template::TemplateService;
