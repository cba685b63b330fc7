pub mod cancellation;
pub mod payment;
pub mod reservation;
pub mod sweeper;

pub use cancellation::CancellationService;
pub use payment::{GatewayCallback, PaymentService};
pub use reservation::{ReservationRequest, ReservationService, TicketSelection};
pub use sweeper::{ExpirySweeper, SweepStats};
