//! mjo: codec for Majiro `MajiroObjX1.000` compiled script containers.
//!
//! The crate provides:
//! - The instruction stream codec, header model and keystream (`mjo`)
//! - Whole-container open/export with XOR de-obfuscation (`container`)
//! - File-oriented helpers (`io`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```no_run
//! use mjo::container::Container;
//! use mjo::mjo::{CodecOptions, KeystreamTable};
//!
//! let key = KeystreamTable::builtin();
//! let script = Container::open("start.mjo", &key, CodecOptions::default()).unwrap();
//! print!("{}", script.disassemble());
//!
//! let image = script.to_bytes(&key).unwrap();
//! assert_eq!(image, std::fs::read("start.mjo").unwrap());
//! ```

pub mod container;
pub mod io;
pub mod mjo;

#[cfg(feature = "cli")]
pub mod cli;
