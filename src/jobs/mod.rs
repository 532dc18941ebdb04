//! Background jobs and their cron wiring.

pub mod executor;
pub mod pending_poller;
pub mod schedule_generator;
pub mod scheduler;
pub mod vencimento_scanner;

pub use executor::ConsultationExecutor;
pub use pending_poller::{PendingWorkPoller, PollResult};
pub use schedule_generator::ScheduleGenerator;
pub use scheduler::{JobError, JobExecutionLog, JobScheduler, JobStatus};
pub use vencimento_scanner::VencimentoScanner;
