pub mod finding;
pub mod record;
pub mod ticket;
