//! Bluetooth LE host attribute stack.
//!
//! Implements the client and server halves of the Attribute Protocol (ATT)
//! and the Generic Attribute Profile (GATT) on top of an external link-layer
//! transport, plus the advertising data format used by the Generic Access
//! Profile. The transport, buffer memory, and scheduling are supplied by the
//! platform through the [`host::Transport`] trait and [`host::Config`].

#![warn(missing_debug_implementations)]
#![warn(non_ascii_idents)]
#![warn(single_use_lifetimes)]
#![warn(unused_extern_crates)]
#![warn(unused_import_braces)]
#![warn(unused_lifetimes)]
#![warn(unused_qualifications)]
#![warn(clippy::nursery)]
#![warn(clippy::pedantic)]
#![allow(clippy::inline_always)]
#![allow(clippy::module_name_repetitions)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::get_unwrap)]
#![warn(clippy::mod_module_files)]
#![warn(clippy::print_stdout)]
#![warn(clippy::str_to_string)]
#![warn(clippy::todo)]
#![warn(clippy::try_err)]
#![warn(clippy::undocumented_unsafe_blocks)]

pub mod att;
pub mod gap;
pub mod gatt;
pub mod host;

mod util;

type SyncMutex<T> = parking_lot::Mutex<T>;
type SyncMutexGuard<'a, T> = parking_lot::MutexGuard<'a, T>;
