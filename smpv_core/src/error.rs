use std::{io, path::PathBuf};

use smpv_schema::{ActorId, ScenarioId, Turn};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SmpvError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("database holds no turns for scenario {0}")]
    EmptyDatabase(ScenarioId),
    #[error("database holds no scenario named {0}")]
    UnknownScenario(ScenarioId),
    #[error("turn {requested} is outside 0..={max_turn}")]
    TurnOutOfRange { requested: Turn, max_turn: Turn },
    #[error("actor {0} is not part of the chart")]
    UnknownActor(ActorId),
    #[error("actor {0} is hidden")]
    ActorHidden(ActorId),
    #[error("at least one actor must stay visible")]
    NoVisibleActors,
    #[error("graph renderer was destroyed")]
    GraphDestroyed,
}

pub type Result<T> = std::result::Result<T, SmpvError>;
