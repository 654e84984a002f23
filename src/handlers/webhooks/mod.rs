mod stripe;

pub use stripe::handle_stripe_webhook;
