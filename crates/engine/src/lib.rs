pub mod deliver;
pub mod error;
pub mod extract;
pub mod generate;
pub mod pipeline;
pub mod scheduler;

pub use deliver::{Deliver, DeliveryError};
pub use error::{Error, ErrorKind};
pub use extract::{Documents, Extract, Pdf, PlainText};
pub use generate::{ChatCompletions, Generate};
pub use pipeline::{Pipeline, PipelineConfig};
pub use scheduler::{Scheduler, SchedulerConfig};
