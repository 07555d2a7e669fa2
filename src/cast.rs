//! Casts producing handles that share the source's control block.
//!
//! Every successful cast joins the source's group (the count goes up by one) and exposes the
//! same object under another element type. The object is still destroyed as the type it was
//! created with, however many casts lie between the creating handle and the last one.

use crate::{
    control_block::ControlBlock,
    error::CastError,
    shared_ptr::SharedPtr
};
use std::any::{ type_name, Any };

/// Runtime type information for [`dynamic_pointer_cast`].
///
/// Implemented for every sized `'static` type and for `dyn Any` (also `+ Send`, `+ Send + Sync`).
/// Make it a supertrait (`trait Shape: AsAny`) to let `SharedPtr<dyn Shape>` be cast back down
/// to its concrete type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any { self }
}

// `self` keeps the vtable of the concrete type, so the check still sees through it
impl AsAny for dyn Any {
    fn as_any(&self) -> &dyn Any { self }
}

impl AsAny for dyn Any + Send {
    fn as_any(&self) -> &dyn Any { self }
}

impl AsAny for dyn Any + Send + Sync {
    fn as_any(&self) -> &dyn Any { self }
}

// std::static_pointer_cast
/// Shares `sptr`'s object as a `U` without any check. An empty source gives an empty handle.
///
/// # Safety
/// The object must be valid to use as a `U` for as long as the returned handle (or anything
/// derived from it) dereferences it. Casting to an unrelated type and back to the original one
/// is always fine as long as the intermediate handle is not dereferenced.
pub unsafe fn static_pointer_cast<U, T>(sptr: &SharedPtr<T>) -> SharedPtr<U>
where T: ?Sized
{
    match (sptr.as_ptr(), sptr.get_rep()) {
        (Some(ptr), Some(rep)) => unsafe {
            ControlBlock::acquire(rep);
            SharedPtr::from_parts(rep, ptr.cast::<U>())
        },
        _ => SharedPtr::null()
    }
}

// std::dynamic_pointer_cast
/// Shares `sptr`'s object as a `U` if it really is one. Otherwise the result is empty and the
/// source's group is left untouched.
pub fn dynamic_pointer_cast<U, T>(sptr: &SharedPtr<T>) -> SharedPtr<U>
where U: Any,
      T: ?Sized + AsAny
{
    try_dynamic_pointer_cast(sptr).unwrap_or_default()
}

/// [`dynamic_pointer_cast`], reporting why the cast failed.
pub fn try_dynamic_pointer_cast<U, T>(sptr: &SharedPtr<T>) -> Result<SharedPtr<U>, CastError>
where U: Any,
      T: ?Sized + AsAny
{
    let (ptr, rep) = match (sptr.as_ptr(), sptr.get_rep()) {
        (Some(ptr), Some(rep)) => (ptr, rep),
        _ => return Err(CastError::Empty)
    };
    if !<T as AsAny>::as_any(unsafe { ptr.as_ref() }).is::<U>() {
        log::debug!("dynamic cast of {:p} to {} failed", ptr, type_name::<U>());
        return Err(CastError::TypeMismatch { target: type_name::<U>() });
    }
    Ok(unsafe {
        ControlBlock::acquire(rep);
        SharedPtr::from_parts(rep, ptr.cast::<U>())
    })
}

#[cfg(test)]
pub mod tests {
    use super::{ dynamic_pointer_cast, static_pointer_cast, try_dynamic_pointer_cast, AsAny };
    use crate::{ error::CastError, shared_ptr::SharedPtr, NULL };
    use std::{
        any::Any,
        error::Error,
        sync::{ Arc, atomic::{ AtomicUsize, Ordering } }
    };
    type TestReturn = Result<(), Box<dyn Error>>;

    trait Entity: AsAny {
        fn kind(&self) -> &'static str;
    }

    struct Player {
        hp: u32,
        drops: Arc<AtomicUsize>
    }
    impl Entity for Player {
        fn kind(&self) -> &'static str { "player" }
    }
    impl Drop for Player {
        fn drop(&mut self) { self.drops.fetch_add(1, Ordering::SeqCst); }
    }

    struct Chest;
    impl Entity for Chest {
        fn kind(&self) -> &'static str { "chest" }
    }

    crate::upcast!(
        Player => dyn Entity,
        Chest => dyn Entity,
        Player => dyn Any,
        Chest => dyn Any + Send + Sync
    );

    fn player(hp: u32, drops: &Arc<AtomicUsize>) -> SharedPtr<dyn Entity> {
        SharedPtr::from_box(Box::new(Player { hp, drops: drops.clone() }))
    }

    fn check_strong_count(get: usize, expect: usize) {
        assert!(get == expect, "Strong count should be {} instead of {}", expect, get);
    }
    fn check_drops(get: &Arc<AtomicUsize>, expect: usize) {
        let get = get.load(Ordering::SeqCst);
        assert!(get == expect, "Object should have been dropped {} times instead of {}", expect, get);
    }

    #[test]
    fn dynamic_cast_to_concrete_type() -> TestReturn {
        let drops = Arc::new(AtomicUsize::new(0));
        let base = player(30, &drops);
        let copy = base.clone();
        check_strong_count(base.strong_count(), 2);
        let derived = dynamic_pointer_cast::<Player, _>(&base);
        check_strong_count(base.strong_count(), 3);
        assert!(derived.get().map(|p| p.hp) == Some(30), "Cast handle should expose the Player");
        assert!(derived == base && derived.ptr_eq(&copy), "Cast handle should share the object");
        // destroyed in construction order, only the last one destroys
        drop(base);
        check_drops(&drops, 0);
        drop(copy);
        check_drops(&drops, 0);
        drop(derived);
        check_drops(&drops, 1);
        Ok(())
    }

    #[test]
    fn dynamic_cast_mismatch_is_empty() -> TestReturn {
        let drops = Arc::new(AtomicUsize::new(0));
        let base = player(10, &drops);
        let chest = dynamic_pointer_cast::<Chest, _>(&base);
        assert!(chest.is_null() && chest == NULL, "Failed cast should give an empty SharedPtr");
        check_strong_count(base.strong_count(), 1);
        assert!(base.kind() == "player", "Source should still own its object");
        match try_dynamic_pointer_cast::<Chest, _>(&base) {
            Err(CastError::TypeMismatch { target }) =>
                assert!(target.ends_with("Chest"), "Mismatch should name the target type, got {}", target),
            _ => return Err("cast to the wrong type should report a mismatch".into())
        }
        check_drops(&drops, 0);
        Ok(())
    }

    #[test]
    fn dynamic_cast_of_empty() -> TestReturn {
        let empty: SharedPtr<dyn Entity> = SharedPtr::null();
        assert!(dynamic_pointer_cast::<Chest, _>(&empty).is_null(), "Cast of an empty SharedPtr should be empty");
        let err = try_dynamic_pointer_cast::<Chest, _>(&empty).err();
        assert!(err == Some(CastError::Empty), "Cast of an empty SharedPtr should report Empty");
        Ok(())
    }

    #[test]
    fn dynamic_cast_of_concrete_handle() -> TestReturn {
        let value = SharedPtr::new(String::from("Door"));
        let same = dynamic_pointer_cast::<String, _>(&value);
        check_strong_count(value.strong_count(), 2);
        assert!(same.len() == 4, "Cast handle should expose the String");
        assert!(dynamic_pointer_cast::<u32, _>(&value).is_null(), "String should not cast to u32");
        check_strong_count(value.strong_count(), 2);
        Ok(())
    }

    #[test]
    fn dynamic_cast_from_any() -> TestReturn {
        let drops = Arc::new(AtomicUsize::new(0));
        let any: SharedPtr<dyn Any> = SharedPtr::from_box(Box::new(Player { hp: 3, drops: drops.clone() }));
        let found = dynamic_pointer_cast::<Player, _>(&any);
        assert!(found.get().map(|p| p.hp) == Some(3), "dyn Any should cast down to the Player");
        check_strong_count(any.strong_count(), 2);
        assert!(dynamic_pointer_cast::<Chest, _>(&any).is_null(), "Player should not cast to Chest");

        let sync_any: SharedPtr<dyn Any + Send + Sync> = SharedPtr::from_box(Box::new(Chest));
        let chest = dynamic_pointer_cast::<Chest, _>(&sync_any);
        assert!(!chest.is_null() && chest == sync_any, "dyn Any + Send + Sync should cast down to Chest");
        assert!(dynamic_pointer_cast::<Player, _>(&sync_any).is_null(), "Chest should not cast to Player");
        drop((any, found));
        check_drops(&drops, 1);
        Ok(())
    }

    #[test]
    fn static_cast_round_trip() -> TestReturn {
        let drops = Arc::new(AtomicUsize::new(0));
        let original = SharedPtr::new(Player { hp: 5, drops: drops.clone() });
        let bytes = unsafe { static_pointer_cast::<u8, _>(&original) };
        let back = unsafe { static_pointer_cast::<Player, _>(&bytes) };
        check_strong_count(original.strong_count(), 3);
        assert!(back == original && bytes == original, "Round trip should address the same object");
        assert!(back.hp == 5, "Round trip should recover the Player");
        drop((original, back));
        check_drops(&drops, 0);
        check_strong_count(bytes.strong_count(), 1);
        // the last owner only knows the object as bytes; the Player is still destroyed
        drop(bytes);
        check_drops(&drops, 1);
        Ok(())
    }

    #[test]
    fn static_cast_from_trait_object() -> TestReturn {
        let drops = Arc::new(AtomicUsize::new(0));
        let base = player(12, &drops);
        let derived = unsafe { static_pointer_cast::<Player, _>(&base) };
        assert!(derived.hp == 12, "Static downcast should expose the Player");
        let empty: SharedPtr<dyn Entity> = SharedPtr::null();
        assert!(unsafe { static_pointer_cast::<Player, _>(&empty) }.is_null(), "Cast of empty should be empty");
        drop(base);
        check_drops(&drops, 0);
        drop(derived);
        check_drops(&drops, 1);
        Ok(())
    }
}
