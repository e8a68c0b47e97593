//! Owning handles for the table boundary

use crate::{GraphError, Result};

/// A move-only owning slot
///
/// `Live` owns its object. `Null` never held one (or was released).
/// `Transferred` gave its object away to a container and can never be used
/// again; every access reports `UseAfterTransfer`.
#[derive(Debug)]
pub enum Handle<T> {
    Live(Box<T>),
    Null,
    Transferred,
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Handle::Null
    }
}

impl<T> Handle<T> {
    /// Wrap an object
    pub fn new(value: T) -> Self {
        Handle::Live(Box::new(value))
    }

    /// An empty slot, ready to receive a constructor's output
    pub fn null() -> Self {
        Handle::Null
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Handle::Live(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Handle::Null)
    }

    pub fn is_transferred(&self) -> bool {
        matches!(self, Handle::Transferred)
    }

    /// Borrow the owned object
    pub fn get(&self) -> Result<&T> {
        match self {
            Handle::Live(value) => Ok(value),
            Handle::Null => Err(null_handle()),
            Handle::Transferred => Err(transferred()),
        }
    }

    /// Borrow the owned object mutably
    pub fn get_mut(&mut self) -> Result<&mut T> {
        match self {
            Handle::Live(value) => Ok(value),
            Handle::Null => Err(null_handle()),
            Handle::Transferred => Err(transferred()),
        }
    }

    /// Drop the owned object, if any
    ///
    /// Releasing a `Null` or `Transferred` handle does nothing: the object
    /// it once referred to, if any, belongs to someone else now.
    pub fn release(&mut self) {
        if self.is_live() {
            *self = Handle::Null;
        }
    }

    /// Consume the handle, returning its object
    pub fn into_inner(self) -> Result<T> {
        match self {
            Handle::Live(value) => Ok(*value),
            Handle::Null => Err(null_handle()),
            Handle::Transferred => Err(transferred()),
        }
    }

    /// Store a constructor's output
    ///
    /// Refuses to overwrite a live object.
    pub(crate) fn put(&mut self, value: T) -> Result<()> {
        if self.is_live() {
            return Err(GraphError::InvalidArgument(
                "output handle already owns an object".to_string(),
            ));
        }
        *self = Handle::new(value);
        Ok(())
    }

    /// Move the object out once `check` accepts it
    ///
    /// `check` sees the object in place and must reject everything the
    /// receiver would. On a failed check the handle still owns its object,
    /// unchanged. Otherwise the handle becomes `Transferred`.
    pub(crate) fn take_checked<C>(&mut self, check: C) -> Result<T>
    where
        C: FnOnce(&T) -> Result<()>,
    {
        check(self.get()?)?;
        self.take()
    }

    /// Hand a copy of the object to `consume`
    ///
    /// For consumers that can only reject the object after taking it. On
    /// failure the handle still owns the original; on success it becomes
    /// `Transferred`.
    pub(crate) fn transfer_cloned<R, F>(&mut self, consume: F) -> Result<R>
    where
        T: Clone,
        F: FnOnce(T) -> Result<R>,
    {
        let value = self.get()?.clone();
        let result = consume(value)?;
        *self = Handle::Transferred;
        Ok(result)
    }

    /// Move the object out unconditionally, marking the handle `Transferred`
    pub(crate) fn take(&mut self) -> Result<T> {
        match std::mem::replace(self, Handle::Transferred) {
            Handle::Live(value) => Ok(*value),
            other => {
                let err = if other.is_null() { null_handle() } else { transferred() };
                *self = other;
                Err(err)
            }
        }
    }
}

fn null_handle() -> GraphError {
    GraphError::InvalidArgument("handle is null".to_string())
}

fn transferred() -> GraphError {
    GraphError::UseAfterTransfer("handle was consumed by an earlier call".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_release_is_idempotent() {
        let mut handle = Handle::new(5u32);
        handle.release();
        assert!(handle.is_null());
        handle.release();
        assert!(handle.is_null());

        let mut gone: Handle<u32> = Handle::Transferred;
        gone.release();
        assert!(gone.is_transferred());
    }

    #[test]
    fn test_take_checked_success_and_failure() {
        let mut handle = Handle::new(String::from("x"));
        let err = handle
            .take_checked(|_| Err(GraphError::DuplicateName("x".to_string())))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateName);
        assert_eq!(handle.get().unwrap(), "x");

        let value = handle.take_checked(|_| Ok(())).unwrap();
        assert_eq!(value, "x");
        assert!(handle.is_transferred());
        assert_eq!(handle.get().unwrap_err().kind(), ErrorKind::UseAfterTransfer);
    }

    #[test]
    fn test_take_checked_moves_without_clone() {
        #[derive(Debug)]
        struct Payload(Vec<u8>);

        let mut handle = Handle::new(Payload(vec![1, 2, 3]));
        let ptr = handle.get().unwrap().0.as_ptr();
        let moved = handle.take_checked(|_| Ok(())).unwrap();
        assert_eq!(moved.0.as_ptr(), ptr);
        assert!(handle.is_transferred());
    }

    #[test]
    fn test_transfer_cloned_keeps_original_on_failure() {
        let mut handle = Handle::new(vec![1u8]);
        let err = handle
            .transfer_cloned(|_| Err::<(), _>(GraphError::CyclicGraph("n".to_string())))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CyclicGraph);
        assert_eq!(handle.get().unwrap(), &vec![1u8]);

        handle.transfer_cloned(|v| Ok(v.len())).unwrap();
        assert!(handle.is_transferred());
    }

    #[test]
    fn test_null_is_invalid_argument() {
        let handle: Handle<u8> = Handle::null();
        assert_eq!(handle.get().unwrap_err().kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_put_refuses_live() {
        let mut handle = Handle::new(1u8);
        assert!(handle.put(2).is_err());
        assert_eq!(*handle.get().unwrap(), 1);
    }
}
