//! Domain types: priorities, tickets, and ticket results

mod priority;
mod ticket;

pub use priority::Priority;
pub use ticket::{
    Constraint, SharedTicket, Ticket, TicketResult, TicketStatus, set_status, shared, short_id, ticket_id,
    ticket_status,
};
