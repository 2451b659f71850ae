//! Concrete item kinds
//!
//! One module per record family:
//! - `string`: `string_id_item` and `string_data_item`
//! - `types`: `type_id_item` and `type_list`
//! - `proto`: `proto_id_item`
//! - `member`: `field_id_item` and `method_id_item`
//! - `classdef`: `class_def_item` and the shared access flags
//! - `classdata`: `class_data_item`
//! - `code`: `code_item` with try blocks and handlers
//! - `debug`: `debug_info_item`
//! - `annotation`: annotations, annotation sets and set ref lists
//! - `directory`: `annotations_directory_item`
//! - `array`: `encoded_array_item`

mod annotation;
mod array;
mod classdata;
mod classdef;
mod code;
mod debug;
mod directory;
mod member;
mod proto;
mod string;
mod types;

pub use annotation::*;
pub use array::*;
pub use classdata::*;
pub use classdef::*;
pub use code::*;
pub use debug::*;
pub use directory::*;
pub use member::*;
pub use proto::*;
pub use string::*;
pub use types::*;
