mod hub;
mod moderation;
mod prank;

pub fn commands() -> Vec<poise::Command<crate::handler::Data, Error>> {
    vec![
        hub::hub(),
        prank::prank(),
        moderation::register(),
    ]
}

pub type Error = anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;
pub type Context<'a> = poise::Context<'a, crate::handler::Data, Error>;
