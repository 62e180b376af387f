//! Shared test harness modules for the osmsync CLI.

use super::*;

mod helpers;
mod steps;
mod unit;
