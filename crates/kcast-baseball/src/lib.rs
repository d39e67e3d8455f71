// Library root: the strikeout projection pipeline. Domain model, reference
// tables, the lineup/stat/market resolvers, scoring and the projection
// engine, plus the orchestrator that drives them per game.

pub mod lineup;
pub mod model;
pub mod modifiers;
pub mod orchestrator;
pub mod projection;
pub mod reference;
pub mod stats;
pub mod vegas;
pub mod vulnerability;
