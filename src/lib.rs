//! Thread-safe reference-counted shared-ownership pointer.
//!
//! [`SharedPtr`] lets several owners share one heap object, destroying it when the last owner
//! lets go. Handles can expose the object as different element types ([`Upcast`],
//! [`static_pointer_cast`], [`dynamic_pointer_cast`]) while sharing a single control block that
//! always destroys the object as the type it was created with.
//!
//! ```
//! use shared_ptr::{ dynamic_pointer_cast, upcast, AsAny, SharedPtr };
//!
//! trait Item: AsAny { fn weight(&self) -> u32; }
//! struct Sword;
//! impl Item for Sword { fn weight(&self) -> u32 { 12 } }
//! upcast!(Sword => dyn Item);
//!
//! let item: SharedPtr<dyn Item> = SharedPtr::from_box(Box::new(Sword));
//! let sword = dynamic_pointer_cast::<Sword, _>(&item);
//! assert!(sword == item);
//! assert_eq!(item.strong_count(), 2);
//! assert_eq!(sword.weight(), 12);
//! ```

pub mod cast;
mod control_block;
pub mod error;
pub mod shared_ptr;

pub use cast::{ dynamic_pointer_cast, static_pointer_cast, try_dynamic_pointer_cast, AsAny };
pub use error::CastError;
pub use shared_ptr::{ Null, SharedPtr, Upcast, NULL };
