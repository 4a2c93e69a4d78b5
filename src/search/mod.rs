//! C3-C9: the search driver and its per-frame stages, split across files
//! because each stage is substantial enough to read on its own; all of them
//! extend `impl Decoder` and share its private state (spec §9 design notes).

mod backtrace;
mod crossword;
mod driver;
mod fwdflat;
mod prune;
