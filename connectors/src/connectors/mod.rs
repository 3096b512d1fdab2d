pub mod fireflies;
pub mod hostaway;
pub mod intercom;
pub mod monday;
pub mod stripe;
