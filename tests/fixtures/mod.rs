//! Test fixtures

mod fake_ap;

pub use fake_ap::{
    ACCESS_POINTS, FakeAp, FakeApConfig, FakeApStats, FakeTrack, Fault, PASSWORD, REUSABLE_BLOB,
    USERNAME,
};
