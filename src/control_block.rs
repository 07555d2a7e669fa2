use allocator_api2::alloc::{ Allocator, Global };
use std::{
    alloc::{ handle_alloc_error, Layout },
    any::type_name,
    ptr::NonNull,
    sync::atomic::{ self, AtomicU32, Ordering }
};

// Past this many uses a wrapping counter could free an object that is still referenced.
const MAX_USES: u32 = i32::MAX as u32;

/// Destroys the object behind an erased pointer as the concrete type it was allocated as.
pub(crate) type Destroyer = unsafe fn(*mut ());

unsafe fn destroy_boxed<U>(obj: *mut ()) {
    drop(unsafe { Box::from_raw(obj as *mut U) })
}

// std::_Ref_count<U>, minus the weak count
#[repr(C)]
pub(crate) struct ControlBlock {
    pointee: NonNull<()>,
    uses: AtomicU32,
    destroyer: Destroyer
}

impl ControlBlock {
    fn get_layout() -> Layout { Layout::new::<Self>() }

    /// Allocates a block owning `obj` with a use count of 1. The destroyer is bound to `U`
    /// here and never recomputed, so handles cast to other element types still destroy `U`.
    pub(crate) fn new<U>(obj: NonNull<U>) -> NonNull<Self> {
        let layout = Self::get_layout();
        let rep = match Global.allocate(layout) {
            Ok(mem) => mem.cast::<Self>(),
            Err(_) => handle_alloc_error(layout)
        };
        unsafe {
            rep.as_ptr().write(Self {
                pointee: obj.cast(),
                uses: AtomicU32::new(1),
                destroyer: destroy_boxed::<U>
            });
        }
        log::trace!("allocated control block {:p} for {}", rep, type_name::<U>());
        rep
    }

    pub(crate) fn uses(&self) -> u32 { self.uses.load(Ordering::Acquire) }

    /// Adds one share.
    ///
    /// # Safety
    /// `this` must be a live block and the caller must already hold a share of it.
    pub(crate) unsafe fn acquire(this: NonNull<Self>) {
        let old = unsafe { this.as_ref() }.uses.fetch_add(1, Ordering::Relaxed);
        if old >= MAX_USES {
            std::process::abort();
        }
    }

    /// Drops one share. The caller that takes the count from 1 to 0 destroys the object
    /// and frees the block; every other caller only decrements.
    ///
    /// # Safety
    /// `this` must be a live block and the caller must give up a share it holds.
    pub(crate) unsafe fn release(this: NonNull<Self>) {
        if unsafe { this.as_ref() }.uses.fetch_sub(1, Ordering::Release) != 1 {
            return;
        }
        // pairs with the Release above on every other share's last use
        atomic::fence(Ordering::Acquire);
        unsafe {
            let (pointee, destroyer) = { let r = this.as_ref(); (r.pointee, r.destroyer) };
            log::trace!("destroying object {:p} of control block {:p}", pointee, this);
            destroyer(pointee.as_ptr());
            Global.deallocate(this.cast(), Self::get_layout());
        }
    }

    /// Points the block at `obj`, keeping the count at 1, then destroys the previous object.
    ///
    /// The block owns `obj` before the old destroyer runs, so a panicking destructor can only
    /// affect the old object.
    ///
    /// # Safety
    /// The caller must hold the only share of `this`.
    pub(crate) unsafe fn rebind<U>(mut this: NonNull<Self>, obj: NonNull<U>) {
        let rep = unsafe { this.as_mut() };
        debug_assert_eq!(rep.uses(), 1, "rebinding a shared control block");
        let (old, old_destroyer) = (rep.pointee, rep.destroyer);
        rep.pointee = obj.cast();
        rep.destroyer = destroy_boxed::<U>;
        log::trace!("rebound control block {:p} to {}", this, type_name::<U>());
        unsafe { old_destroyer(old.as_ptr()) };
    }
}
