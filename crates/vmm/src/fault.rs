//! Page fault handling.
//!
//! A fault is either resolved, by growing the stack or bringing in the page the supplemental
//! page table describes, or rejected, in which case the process is killed with
//! [`KILLED_EXIT_STATUS`]. There is no copy-on-write, so any fault on a present page is a
//! rejection.

use x86_64::structures::idt::PageFaultErrorCode;

use crate::{
    VirtualAddress,
    address_space::AddressSpace,
    error::Rejection,
    layout::{STACK_LIMIT, STACK_SLACK, USER_STACK},
    page::Page,
};

/// Exit status of a process killed by a rejected fault.
pub const KILLED_EXIT_STATUS: i32 = -1;

/// A page fault, as reported by the trap handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFault {
    /// The faulting address.
    pub address: VirtualAddress,
    /// The access came from user mode.
    pub user: bool,
    /// The access was a write.
    pub write: bool,
    /// No page was present; otherwise this is a protection violation.
    pub not_present: bool,
    /// The user stack pointer from the trap frame.
    pub stack_pointer: usize,
}

impl PageFault {
    /// Decodes an x86_64 page fault error code.
    pub fn from_error_code(
        address: VirtualAddress,
        code: PageFaultErrorCode,
        stack_pointer: usize,
    ) -> Self {
        Self {
            address,
            user: code.contains(PageFaultErrorCode::USER_MODE),
            write: code.contains(PageFaultErrorCode::CAUSED_BY_WRITE),
            not_present: !code.contains(PageFaultErrorCode::PROTECTION_VIOLATION),
            stack_pointer,
        }
    }
}

/// How a fault was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// An existing page was brought in.
    Resolved,
    /// A new stack page was created.
    StackGrown,
}

/// Returns true if a fault at `address` counts as the stack growing down.
///
/// The address must lie in the stack region and at most [`STACK_SLACK`] bytes below the stack
/// pointer. A stack pointer of zero has not been set yet and never allows growth.
pub fn is_stack_access(address: VirtualAddress, stack_pointer: usize) -> bool {
    let address = address.as_usize();
    stack_pointer != 0
        && (STACK_LIMIT..=USER_STACK).contains(&address)
        && address >= stack_pointer.saturating_sub(STACK_SLACK)
}

impl AddressSpace {
    /// Handles a page fault in this address space.
    ///
    /// On rejection the caller must terminate the process with [`KILLED_EXIT_STATUS`].
    pub fn handle_fault(&mut self, fault: &PageFault) -> Result<Resolution, Rejection> {
        log::trace!(
            "{}: page fault at {} (user: {}, write: {}, not present: {})",
            self.name,
            fault.address,
            fault.user,
            fault.write,
            fault.not_present
        );
        let result = self.resolve_fault(fault);
        if let Err(rejection) = result {
            log::warn!(
                "{}: page fault at {} rejected: {}",
                self.name,
                fault.address,
                rejection
            );
        }
        result
    }

    fn resolve_fault(&mut self, fault: &PageFault) -> Result<Resolution, Rejection> {
        let address = fault.address;
        if address.is_null() {
            return Err(Rejection::NullAddress);
        }
        if address.is_kernel() {
            return Err(Rejection::KernelAddress);
        }
        if !fault.not_present {
            return Err(Rejection::ProtectionViolation);
        }

        let stack_pointer = if fault.user {
            fault.stack_pointer
        } else {
            self.saved_stack_pointer
        };

        let Some(page) = self.spt.find(address).cloned() else {
            if is_stack_access(address, stack_pointer) {
                self.grow_stack(address)?;
                return Ok(Resolution::StackGrown);
            }
            return Err(Rejection::Unmapped);
        };

        if fault.write && !page.writable() {
            return Err(Rejection::ReadOnly);
        }
        self.frames.claim(&page, &self.directory).map_err(|err| {
            log::warn!("{}: cannot bring in {}: {}", self.name, page.va(), err);
            Rejection::LoadFailed
        })?;
        Ok(Resolution::Resolved)
    }

    fn grow_stack(&mut self, address: VirtualAddress) -> Result<(), Rejection> {
        let va = address.page_round_down();
        let page = Page::zeroed(va, true);
        self.spt
            .insert(page.clone())
            .map_err(|_| Rejection::Unmapped)?;
        if let Err(err) = self.frames.claim(&page, &self.directory) {
            log::warn!("{}: cannot grow stack to {}: {}", self.name, va, err);
            self.spt.remove(va, &self.frames);
            return Err(Rejection::LoadFailed);
        }
        log::trace!("{}: stack grown to {}", self.name, va);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        layout::{KERNEL_BASE, PAGE_SIZE},
        testing::{self, user_page},
    };
    use alloc::sync::Arc;

    fn space(frames: usize, swap_slots: usize) -> AddressSpace {
        let (table, _) = testing::frame_table(frames, swap_slots);
        AddressSpace::new("fault-test", table)
    }

    fn user_fault(address: usize, write: bool, stack_pointer: usize) -> PageFault {
        PageFault {
            address: VirtualAddress::new(address),
            user: true,
            write,
            not_present: true,
            stack_pointer,
        }
    }

    #[test]
    fn decodes_error_code() {
        let code = PageFaultErrorCode::CAUSED_BY_WRITE | PageFaultErrorCode::USER_MODE;
        let fault = PageFault::from_error_code(VirtualAddress::new(0x1000), code, 0x2000);
        assert!(fault.user);
        assert!(fault.write);
        assert!(fault.not_present);
        assert_eq!(fault.stack_pointer, 0x2000);

        let fault = PageFault::from_error_code(
            VirtualAddress::new(0x1000),
            PageFaultErrorCode::PROTECTION_VIOLATION,
            0,
        );
        assert!(!fault.user);
        assert!(!fault.not_present);
    }

    #[test]
    fn rejects_null_and_kernel_addresses() {
        let mut space = space(1, 0);
        assert_eq!(
            space.handle_fault(&user_fault(0, false, USER_STACK)),
            Err(Rejection::NullAddress)
        );
        assert_eq!(
            space.handle_fault(&user_fault(KERNEL_BASE, false, USER_STACK)),
            Err(Rejection::KernelAddress)
        );
    }

    #[test]
    fn rejects_protection_violations() {
        let mut space = space(1, 0);
        let mut fault = user_fault(user_page(0).as_usize(), true, USER_STACK);
        fault.not_present = false;
        assert_eq!(
            space.handle_fault(&fault),
            Err(Rejection::ProtectionViolation)
        );
    }

    #[test]
    fn stack_grows_at_slack_boundary() {
        let mut space = space(2, 0);
        let sp = USER_STACK - 2 * PAGE_SIZE;
        assert_eq!(
            space.handle_fault(&user_fault(sp - STACK_SLACK, true, sp)),
            Ok(Resolution::StackGrown)
        );
        assert_eq!(space.spt().len(), 1);
        let page = space.spt().find(VirtualAddress::new(sp - STACK_SLACK)).unwrap();
        assert_eq!(page.va(), VirtualAddress::new(sp - PAGE_SIZE));
        assert!(page.is_resident());
        space.check_ownership();
    }

    #[test]
    fn stack_does_not_grow_past_slack() {
        let mut space = space(2, 0);
        let sp = USER_STACK - 2 * PAGE_SIZE;
        assert_eq!(
            space.handle_fault(&user_fault(sp - STACK_SLACK - 1, true, sp)),
            Err(Rejection::Unmapped)
        );
        assert!(space.spt().is_empty());
    }

    #[test]
    fn stack_does_not_grow_below_limit() {
        let mut space = space(2, 0);
        assert_eq!(
            space.handle_fault(&user_fault(STACK_LIMIT - 4, true, STACK_LIMIT)),
            Err(Rejection::Unmapped)
        );
        assert_eq!(
            space.handle_fault(&user_fault(STACK_LIMIT, true, STACK_LIMIT)),
            Ok(Resolution::StackGrown)
        );
    }

    #[test]
    fn unset_stack_pointer_never_grows() {
        let mut space = space(2, 0);
        assert!(!is_stack_access(VirtualAddress::new(USER_STACK - 8), 0));
        assert_eq!(
            space.handle_fault(&user_fault(USER_STACK - 8, true, 0)),
            Err(Rejection::Unmapped)
        );

        let kernel_fault = PageFault {
            user: false,
            ..user_fault(USER_STACK - 8, true, USER_STACK)
        };
        assert_eq!(space.handle_fault(&kernel_fault), Err(Rejection::Unmapped));
        assert!(space.spt().is_empty());
    }

    #[test]
    fn kernel_faults_use_saved_stack_pointer() {
        let mut space = space(2, 0);
        let sp = USER_STACK - 4 * PAGE_SIZE;
        space.save_user_stack_pointer(sp);
        let fault = PageFault {
            address: VirtualAddress::new(sp - 4),
            user: false,
            write: true,
            not_present: true,
            stack_pointer: 0,
        };
        assert_eq!(space.handle_fault(&fault), Ok(Resolution::StackGrown));

        space.save_user_stack_pointer(USER_STACK);
        let fault = PageFault {
            address: VirtualAddress::new(sp - 2 * PAGE_SIZE),
            ..fault
        };
        assert_eq!(space.handle_fault(&fault), Err(Rejection::Unmapped));
    }

    #[test]
    fn swapped_stack_page_is_resolved_not_replaced() {
        let mut space = space(1, 2);
        space.setup_stack().unwrap();
        let top = VirtualAddress::new(USER_STACK - 8);
        space.write_user(top, b"retaddr!").unwrap();
        assert!(space.page_out(top));

        let original = space.spt().find(top).cloned().unwrap();
        assert_eq!(
            space.handle_fault(&user_fault(top.as_usize(), false, top.as_usize())),
            Ok(Resolution::Resolved)
        );
        assert!(Arc::ptr_eq(space.spt().find(top).unwrap(), &original));

        let mut buf = [0; 8];
        space.read_user(top, &mut buf).unwrap();
        assert_eq!(&buf, b"retaddr!");
    }

    #[test]
    fn rejects_unmapped_and_read_only() {
        let mut space = space(1, 0);
        assert_eq!(
            space.handle_fault(&user_fault(user_page(0).as_usize(), false, USER_STACK)),
            Err(Rejection::Unmapped)
        );

        space.spt.insert(Page::zeroed(user_page(0), false)).unwrap();
        assert_eq!(
            space.handle_fault(&user_fault(user_page(0).as_usize(), true, USER_STACK)),
            Err(Rejection::ReadOnly)
        );
        assert_eq!(
            space.handle_fault(&user_fault(user_page(0).as_usize(), false, USER_STACK)),
            Ok(Resolution::Resolved)
        );
    }

    #[test]
    fn out_of_frames_rejects_growth() {
        let mut space = space(0, 0);
        assert_eq!(
            space.handle_fault(&user_fault(USER_STACK - 8, true, USER_STACK)),
            Err(Rejection::LoadFailed)
        );
        assert!(space.spt().is_empty());
    }
}
