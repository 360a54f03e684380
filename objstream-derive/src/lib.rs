//! Derive macros for objstream types.
//!
//! [`StreamObject`] describes a plain struct as a serializable class and generates
//! conversions between the struct and its heap instances.
//!
//! # Example
//!
//! ```ignore
//! use objstream_derive::StreamObject;
//!
//! #[derive(StreamObject)]
//! #[objstream(name = "com.example.Person", serial_version_uid = 1)]
//! struct Person {
//!     name: String,
//!     age: i32,
//!     #[objstream(rename = "emailAddress")]
//!     email: Option<String>,
//!     #[objstream(transient)]
//!     cached_hash: i32,
//! }
//! ```

extern crate proc_macro;

mod stream_object;

use proc_macro::TokenStream;

/// Derives `DescribeType` and `StreamObject` for a struct.
///
/// # Attributes
///
/// ## Struct-level
/// - `#[objstream(name = "...")]`: the stream class name (defaults to the Rust
///   struct name).
/// - `#[objstream(serial_version_uid = N)]`: declares the serial version UID; without
///   it the UID is computed from the class shape.
///
/// ## Field-level
/// - `#[objstream(rename = "...")]`: overrides the stream field name.
/// - `#[objstream(transient)]`: declares the field transient. It is not written and
///   reads back as `Default::default()`.
/// - `#[objstream(skip)]`: leaves the field out of the class entirely.
///
/// # Supported Field Types
///
/// `bool`, `i8`, `u16` (as `char`), `i16`, `i32`, `i64`, `f32`, `f64`, `String` and
/// `Option<String>`.
#[proc_macro_derive(StreamObject, attributes(objstream))]
pub fn derive_stream_object(input: TokenStream) -> TokenStream {
    stream_object::derive_stream_object_impl(input)
}
