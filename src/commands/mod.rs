pub mod transfer;
pub mod vibe;

use crate::{Data, Error};

pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![
        vibe::start(),
        vibe::plusvibe(),
        vibe::minusvibe(),
        vibe::myvibe(),
        vibe::topvibe(),
        vibe::history(),
        vibe::levels(),
        vibe::achievements(),
        vibe::daily(),
        transfer::transfer(),
        transfer::cancel(),
    ]
}
