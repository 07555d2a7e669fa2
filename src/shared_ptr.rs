use crate::control_block::ControlBlock;
use std::{
    fmt::{ self, Debug, Display },
    hash::{ Hash, Hasher },
    marker::PhantomData,
    mem::ManuallyDrop,
    ops::Deref,
    ptr::{ self, NonNull }
};

/// Pointer conversion from `Self` to `T` that keeps the address of the object.
///
/// This is what lets a `SharedPtr<T>` adopt, share, or take over a `U` (the "U convertible to T"
/// relation): implemented for every type onto itself, and through [`upcast!`](crate::upcast) for
/// unsizing coercions such as a concrete type onto a trait object.
///
/// # Safety
/// `upcast` must return a pointer to the same object at the same address (pointer metadata may
/// change). Equality, casting and destruction all rely on it.
pub unsafe trait Upcast<T: ?Sized> {
    fn upcast(ptr: NonNull<Self>) -> NonNull<T>;
}

unsafe impl<T: ?Sized> Upcast<T> for T {
    fn upcast(ptr: NonNull<Self>) -> NonNull<T> { ptr }
}

/// Implements [`Upcast`] for coercions the compiler already knows about.
///
/// ```
/// use shared_ptr::{ upcast, SharedPtr };
///
/// trait Shape { fn area(&self) -> f64; }
/// struct Square(f64);
/// impl Shape for Square { fn area(&self) -> f64 { self.0 * self.0 } }
/// upcast!(Square => dyn Shape);
///
/// let shape: SharedPtr<dyn Shape> = SharedPtr::from_box(Box::new(Square(2.0)));
/// assert_eq!(shape.area(), 4.0);
/// ```
#[macro_export]
macro_rules! upcast {
    ($($from:ty => $to:ty),+ $(,)?) => {$(
        unsafe impl $crate::Upcast<$to> for $from {
            fn upcast(ptr: ::std::ptr::NonNull<Self>) -> ::std::ptr::NonNull<$to> { ptr }
        }
    )+};
}

/// Null constant that a [`SharedPtr`] of any element type can be compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Null;

pub const NULL: Null = Null;

// std::shared_ptr
/// Thread-safe reference-counted shared-ownership pointer.
///
/// Every handle sharing an object references the same control block, which counts the handles
/// and remembers how to destroy the object as the type it was created with. The object is
/// destroyed exactly once, when the last handle is dropped, reset or assigned over.
///
/// Handles may expose the object under different element types (through [`Upcast`] or the
/// functions in [`cast`](crate::cast)) while still sharing one count. Only the count is
/// synchronized; access to the object itself is the caller's concern.
pub struct SharedPtr<T: ?Sized> {
    ptr: Option<NonNull<T>>,
    rep: Option<NonNull<ControlBlock>>,
    _data: PhantomData<T>
}

unsafe impl<T: ?Sized + Send + Sync> Send for SharedPtr<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for SharedPtr<T> {}

impl<T> SharedPtr<T> {
    /// Moves `value` to the heap and wraps it in a new sharing group.
    pub fn new(value: T) -> Self { Self::from_box(Box::new(value)) }
}

impl<T: ?Sized> SharedPtr<T> {
    /// An empty handle. Owns nothing and allocates nothing.
    pub const fn null() -> Self {
        Self { ptr: None, rep: None, _data: PhantomData }
    }

    /// Takes ownership of `obj`, starting a new sharing group with a count of 1.
    pub fn from_box<U>(obj: Box<U>) -> Self
    where U: Upcast<T>
    {
        Self::adopt(NonNull::from(Box::leak(obj)))
    }

    /// Takes ownership of a pointer produced by `Box::into_raw`. A null pointer gives an empty
    /// handle.
    ///
    /// # Safety
    /// `obj` must come from `Box::<U>::into_raw` and must not be owned by anything else,
    /// including another sharing group. The right to destroy it moves to the new handle.
    pub unsafe fn from_raw<U>(obj: *mut U) -> Self
    where U: Upcast<T>
    {
        match NonNull::new(obj) {
            Some(obj) => Self::adopt(obj),
            None => Self::null()
        }
    }

    fn adopt<U>(obj: NonNull<U>) -> Self
    where U: Upcast<T>
    {
        let rep = ControlBlock::new(obj);
        unsafe { Self::from_parts(rep, <U as Upcast<T>>::upcast(obj)) }
    }

    /// Aliasing constructor: joins the group of `rep` exposing `ptr`. The use count is left
    /// alone; the caller hands over a share it already accounted for.
    ///
    /// # Safety
    /// The caller must own one unclaimed share of `rep`, and `ptr` must address the object
    /// `rep` manages.
    pub(crate) unsafe fn from_parts(rep: NonNull<ControlBlock>, ptr: NonNull<T>) -> Self {
        Self { ptr: Some(ptr), rep: Some(rep), _data: PhantomData }
    }

    pub(crate) fn get_rep(&self) -> Option<NonNull<ControlBlock>> { self.rep }

    /// Joins this handle's group as a `SharedPtr<U>`. Copy construction across convertible types.
    pub fn share_as<U: ?Sized>(&self) -> SharedPtr<U>
    where T: Upcast<U>
    {
        match (self.ptr, self.rep) {
            (Some(ptr), Some(rep)) => unsafe {
                ControlBlock::acquire(rep);
                SharedPtr::from_parts(rep, <T as Upcast<U>>::upcast(ptr))
            },
            _ => SharedPtr::null()
        }
    }

    /// Hands this handle's share over to a `SharedPtr<U>` without touching the count. Move
    /// construction across convertible types.
    pub fn upcast<U: ?Sized>(self) -> SharedPtr<U>
    where T: Upcast<U>
    {
        // the share moves to the result, so this handle must not release it
        let this = ManuallyDrop::new(self);
        SharedPtr { ptr: this.ptr.map(<T as Upcast<U>>::upcast), rep: this.rep, _data: PhantomData }
    }

    /// Moves the share out, leaving this handle empty.
    pub fn take(&mut self) -> Self { std::mem::take(self) }

    /// Copy assignment across convertible types. The previous share is released first and
    /// destroys its object if it was the last one.
    pub fn assign_shared<U: ?Sized>(&mut self, other: &SharedPtr<U>)
    where U: Upcast<T>
    {
        if self.rep.is_some() && *self == *other {
            return;
        }
        *self = other.share_as::<T>();
    }

    /// Move assignment across convertible types.
    pub fn assign<U: ?Sized>(&mut self, other: SharedPtr<U>)
    where U: Upcast<T>
    {
        *self = other.upcast::<T>();
    }

    /// Gives up this handle's share, destroying the object if it was the last one.
    pub fn reset(&mut self) {
        drop(self.take())
    }

    /// Gives up the current share, then takes ownership of `obj`.
    ///
    /// A handle that was the sole owner keeps its control block and rebinds it to `obj`; a
    /// handle that shared its block leaves the group and starts a new one, so the other owners
    /// keep their object.
    pub fn reset_with<U>(&mut self, obj: Box<U>)
    where U: Upcast<T>
    {
        let obj = NonNull::from(Box::leak(obj));
        match self.rep {
            Some(rep) if self.unique() => {
                // retarget before the old object's destructor runs
                self.ptr = Some(<U as Upcast<T>>::upcast(obj));
                unsafe { ControlBlock::rebind(rep, obj) };
            }
            _ => *self = Self::adopt(obj)
        }
    }

    pub fn get(&self) -> Option<&T> { self.ptr.map(|p| unsafe { &*p.as_ptr() }) }

    /// Mutable access, only while this handle is the only one in its group.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        match self.unique() {
            true => self.ptr.map(|p| unsafe { &mut *p.as_ptr() }),
            false => None
        }
    }

    pub fn as_ptr(&self) -> Option<NonNull<T>> { self.ptr }

    pub fn is_null(&self) -> bool { self.ptr.is_none() }

    /// Number of handles in this handle's group; 0 for an empty handle.
    pub fn strong_count(&self) -> usize {
        match self.rep {
            Some(rep) => unsafe { rep.as_ref() }.uses() as usize,
            None => 0
        }
    }

    pub fn unique(&self) -> bool { self.strong_count() == 1 }

    /// Whether both handles belong to the same group. Empty handles belong to no group.
    pub fn ptr_eq<U: ?Sized>(&self, other: &SharedPtr<U>) -> bool {
        self.rep.is_some() && self.rep == other.rep
    }

    fn addr(&self) -> *const () {
        match self.ptr {
            Some(p) => p.cast::<()>().as_ptr() as *const (),
            None => ptr::null()
        }
    }
}

impl<T: ?Sized> Default for SharedPtr<T> {
    fn default() -> Self { Self::null() }
}

impl<T: ?Sized> Clone for SharedPtr<T> {
    fn clone(&self) -> Self { self.share_as::<T>() }

    fn clone_from(&mut self, source: &Self) { self.assign_shared(source) }
}

impl<T: ?Sized> Drop for SharedPtr<T> {
    fn drop(&mut self) {
        if let Some(rep) = self.rep.take() {
            unsafe { ControlBlock::release(rep) }
        }
    }
}

impl<T: ?Sized> Deref for SharedPtr<T> {
    type Target = T;

    /// # Panics
    /// If the handle is empty. Check [`SharedPtr::is_null`] first.
    fn deref(&self) -> &Self::Target {
        match self.get() {
            Some(v) => v,
            None => panic!("dereferenced an empty SharedPtr")
        }
    }
}

impl<T> From<Box<T>> for SharedPtr<T> {
    fn from(value: Box<T>) -> Self { Self::from_box(value) }
}

// handles compare by the object they address, whatever element type they expose it as; the
// group is part of it since boxed zero-sized objects all share one dangling address
impl<T: ?Sized, U: ?Sized> PartialEq<SharedPtr<U>> for SharedPtr<T> {
    fn eq(&self, other: &SharedPtr<U>) -> bool {
        self.rep == other.rep && self.addr() == other.addr()
    }
}

impl<T: ?Sized> Eq for SharedPtr<T> {}

impl<T: ?Sized> PartialEq<Null> for SharedPtr<T> {
    fn eq(&self, _: &Null) -> bool { self.is_null() }
}

impl<T: ?Sized> PartialEq<SharedPtr<T>> for Null {
    fn eq(&self, other: &SharedPtr<T>) -> bool { other.is_null() }
}

impl<T: ?Sized> Hash for SharedPtr<T> {
    fn hash<H>(&self, state: &mut H)
    where H: Hasher
    {
        self.addr().hash(state)
    }
}

impl<T> Debug for SharedPtr<T>
where T: ?Sized + Debug
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedPtr {{ data: {:?}, strong: {} }}", self.get(), self.strong_count())
    }
}

impl<T> Display for SharedPtr<T>
where T: ?Sized + Display
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(v) => write!(f, "{}", v),
            None => write!(f, "null")
        }
    }
}

impl<T: ?Sized> fmt::Pointer for SharedPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.addr(), f)
    }
}
