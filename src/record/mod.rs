//! Record storage
//!
//! Records are encoded into a compact image keyed by identifier. Attribute
//! types are stored by interned index. Attributes with many values may be
//! moved to a side table with one duplicate per value.

mod codec;
mod entry;
mod errors;
mod id2entry;
mod multival;
mod nextid;

pub use codec::{AttrThreshold, Encoded, Layout, MultivalPolicy, MultivalThreshold, RecordCodec, HIGH_BIT, MV_BIT};
pub use entry::{AttrFlags, Attribute, ObjectClassFlags, Record};
pub use errors::{CodecError, CodecResult};
pub use id2entry::{PrimaryStore, PRIMARY_SPACE};
pub use multival::{encode_side_value, split_side_value, SideTable, SideValueOrder, SIDE_VALUE_SPACE};
pub use nextid::NextId;
