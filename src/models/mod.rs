pub mod booking;
pub mod event;

pub use booking::{Booking, BookingStatus, BookingTicket, PaymentMethod};
pub use event::{Event, TicketTier};
