// Core draft engine: pure derivations (sequencer, clock, gate) plus the two
// stateful pieces (resolver's pending pick, reconciler's accepted view).

pub mod clock;
pub mod gate;
pub mod reconciler;
pub mod resolver;
pub mod sequencer;
pub mod snapshot;
