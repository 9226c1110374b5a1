// This module emits the fixed bootstrap prologue that carries the image from the
// firmware hand-off to 64-bit execution: the multiboot2 header the loader scans
// for, an initial stack pointer, preservation of the loader-provided magic/info
// registers across the mode switch, a three-level page table identity-mapping
// the first gigabyte in 2 MiB pages, PIC masking, a null IDT, the CR4/CR3/EFER/
// CR0 dance into long mode, a minimal flat GDT and the far jump into the 64-bit
// entry, which reloads the data segments, restores magic/info into rsi/rdx and
// anchors the frame base below the boot stack. All magic numbers live as named
// constants so the arithmetic (header checksum, page-table geometry, selector
// values) is testable without re-deriving the emitted text. The block is emitted
// exactly once, before any type or method code, and is never re-entered.

//! Bootstrap prologue: multiboot2 header and the long-mode transition.

use super::emitter::AsmEmitter;

/// Multiboot2 header magic.
pub const MULTIBOOT2_MAGIC: u32 = 0xE852_50D6;
/// Multiboot2 architecture tag for i386 protected mode.
pub const MULTIBOOT2_ARCH: u32 = 0;
/// Declared header length in bytes.
pub const MULTIBOOT2_HEADER_LEN: u32 = 16;

/// Header checksum: magic + arch + length + checksum must wrap to zero.
pub const fn multiboot2_checksum() -> u32 {
    0u32.wrapping_sub(MULTIBOOT2_MAGIC + MULTIBOOT2_ARCH + MULTIBOOT2_HEADER_LEN)
}

/// Physical address of the initial boot stack top.
pub const KERNEL_STACK: u32 = 0x0020_0000;
/// The frame base sits this many bytes below the boot stack top.
pub const FRAME_BASE_OFFSET: u32 = 1024;

/// Entries in the single page directory; 512 * 2 MiB maps the first GiB.
pub const PAGE_DIR_ENTRIES: u32 = 512;
/// Large-page granularity.
pub const PAGE_SIZE_2M: u32 = 0x0020_0000;
/// Size of one page-table level.
pub const PAGE_TABLE_BYTES: u32 = 4096;
/// Table entry flags: present | writable.
pub const PTE_PRESENT_WRITABLE: u64 = 0b11;
/// Directory entry flags: present | writable | 2 MiB page.
pub const PDE_LARGE_PAGE: u64 = 0b1000_0011;

/// CR4 bits enabled before paging (PAE and global-page enable).
pub const CR4_BITS: u32 = 0b1010_0000;
/// Extended feature MSR holding the long-mode enable bit.
pub const EFER_MSR: u32 = 0xC000_0080;
/// Long-mode enable bit in EFER.
pub const EFER_LME: u32 = 0x0000_0100;
/// CR0 bits enabling paging and protection.
pub const CR0_PG_PE: u32 = 0x8000_0001;

/// 64-bit flat code segment descriptor.
pub const GDT_CODE: u64 = 0x0020_9A00_0000_0000;
/// Flat data segment descriptor.
pub const GDT_DATA: u64 = 0x0000_9200_0000_0000;
/// Selector of the code descriptor.
pub const SEL_CODE: u16 = 0x0008;
/// Selector of the data descriptor.
pub const SEL_DATA: u16 = 0x0010;

/// Mask written to both PIC data ports to silence every legacy IRQ.
pub const PIC_MASK_ALL: u8 = 0xFF;

/// Entry symbol the linker script expects.
pub const ENTRY_SYMBOL: &str = "_start";

/// Label of the 64-bit landing point.
const LONG_MODE_ENTRY: &str = "long_mode_entry";

/// Emit the whole bootstrap block.
///
/// Must run exactly once, before any static-field or method emission; the
/// generated code falls through from the 64-bit entry into whatever the
/// selector emits next.
pub fn emit_bootstrap(e: &mut AsmEmitter) {
    e.line("[bits 32]");
    e.linef(format_args!("[global {ENTRY_SYMBOL}]"));
    e.linef(format_args!("KERNEL_STACK equ 0x{KERNEL_STACK:08X}"));

    // Multiboot2 header followed by the required end tag.
    e.linef(format_args!("dd 0x{MULTIBOOT2_MAGIC:08X}"));
    e.linef(format_args!("dd {MULTIBOOT2_ARCH}"));
    e.linef(format_args!("dd {MULTIBOOT2_HEADER_LEN}"));
    e.linef(format_args!("dd 0x{:08X}", multiboot2_checksum()));
    e.line("dw 0");
    e.line("dw 0");
    e.line("dd 8");

    // Entry: set up the boot stack, clear EFLAGS, then park the loader's
    // magic (eax) and info pointer (ebx) as two zero-extended qwords so the
    // 64-bit side can pop them. Magic goes last so it is popped first.
    e.linef(format_args!("{ENTRY_SYMBOL}:"));
    e.line("mov esp,KERNEL_STACK");
    e.line("push 0");
    e.line("popf");
    e.line("push 0");
    e.line("push ebx");
    e.line("push 0");
    e.line("push eax");
    e.line("jmp enter_long_mode");

    e.line("align 4");
    e.line("IDT:");
    e.line(".Length dw 0");
    e.line(".Base dd 0");

    // Page tables: one PML4 entry -> one PDPT entry -> 512 2 MiB mappings.
    e.line("enter_long_mode:");
    e.line("mov edi,p4_table");
    e.linef(format_args!("mov eax,p3_table"));
    e.linef(format_args!("or eax,0b{PTE_PRESENT_WRITABLE:b}"));
    e.line("mov [p4_table],eax");
    e.line("mov eax,p2_table");
    e.linef(format_args!("or eax,0b{PTE_PRESENT_WRITABLE:b}"));
    e.line("mov [p3_table],eax");
    e.line("mov ecx,0");

    e.line(".map_p2_table:");
    e.linef(format_args!("mov eax,0x{PAGE_SIZE_2M:X}"));
    e.line("mul ecx");
    e.linef(format_args!("or eax,0b{PDE_LARGE_PAGE:b}"));
    e.line("mov [p2_table+ecx*8],eax");
    e.line("inc ecx");
    e.linef(format_args!("cmp ecx,{PAGE_DIR_ENTRIES}"));
    e.line("jne .map_p2_table");

    // Mask the legacy PICs, load the null IDT, flip the mode bits.
    e.linef(format_args!("mov al,0x{PIC_MASK_ALL:02X}"));
    e.line("out 0xA1,al");
    e.line("out 0x21,al");
    e.line("cli");
    e.line("lidt [IDT]");
    e.linef(format_args!("mov eax,0b{CR4_BITS:b}"));
    e.line("mov cr4,eax");
    e.line("mov edx,edi");
    e.line("mov cr3,edx");
    e.linef(format_args!("mov ecx,0x{EFER_MSR:08X}"));
    e.line("rdmsr");
    e.linef(format_args!("or eax,0x{EFER_LME:08X}"));
    e.line("wrmsr");
    e.line("mov ebx,cr0");
    e.linef(format_args!("or ebx,0x{CR0_PG_PE:08X}"));
    e.line("mov cr0,ebx");
    e.line("lgdt [GDT.Pointer]");
    e.linef(format_args!("jmp 0x{SEL_CODE:04X}:{LONG_MODE_ENTRY}"));

    e.line("GDT:");
    e.line(".Null:");
    e.line("dq 0x0000000000000000");
    e.line(".Code:");
    e.linef(format_args!("dq 0x{GDT_CODE:016X}"));
    e.linef(format_args!("dq 0x{GDT_DATA:016X}"));
    e.line("align 4");
    e.line("dw 0");
    e.line(".Pointer:");
    e.line("dw $-GDT-1");
    e.line("dd GDT");

    e.line("align 4096");
    e.line("p4_table:");
    e.linef(format_args!("resb {PAGE_TABLE_BYTES}"));
    e.line("p3_table:");
    e.linef(format_args!("resb {PAGE_TABLE_BYTES}"));
    e.line("p2_table:");
    e.linef(format_args!("resb {PAGE_TABLE_BYTES}"));

    // 64-bit landing point: flat data segments, recover magic/info, anchor
    // the frame base below the boot stack.
    e.line("[bits 64]");
    e.linef(format_args!("{LONG_MODE_ENTRY}:"));
    e.linef(format_args!("mov ax,0x{SEL_DATA:04X}"));
    e.line("mov ds,ax");
    e.line("mov es,ax");
    e.line("mov fs,ax");
    e.line("mov gs,ax");
    e.line("mov ss,ax");
    e.line("pop rsi");
    e.line("pop rdx");
    e.linef(format_args!("mov rbp,KERNEL_STACK-{FRAME_BASE_OFFSET}"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x64::frame::POINTER_SIZE;

    #[test]
    fn checksum_wraps_header_to_zero() {
        let sum = MULTIBOOT2_MAGIC
            .wrapping_add(MULTIBOOT2_ARCH)
            .wrapping_add(MULTIBOOT2_HEADER_LEN)
            .wrapping_add(multiboot2_checksum());
        assert_eq!(sum, 0);
    }

    #[test]
    fn page_geometry_covers_first_gigabyte() {
        assert_eq!(
            PAGE_DIR_ENTRIES as u64 * PAGE_SIZE_2M as u64,
            1 << 30
        );
        assert_eq!(PAGE_TABLE_BYTES, PAGE_DIR_ENTRIES * 8);
    }

    #[test]
    fn frame_base_is_pointer_aligned_below_the_stack() {
        assert_eq!(FRAME_BASE_OFFSET as i64 % POINTER_SIZE, 0);
        assert!(FRAME_BASE_OFFSET < KERNEL_STACK);
    }

    #[test]
    fn bootstrap_landmarks_appear_exactly_once() {
        let mut e = AsmEmitter::new();
        emit_bootstrap(&mut e);
        let text = e.finish();

        for landmark in [
            "dd 0xE85250D6",
            "[global _start]",
            "jmp 0x0008:long_mode_entry",
            "mov ecx,0xC0000080",
            "lgdt [GDT.Pointer]",
            "mov rbp,KERNEL_STACK-1024",
        ] {
            assert_eq!(
                text.matches(landmark).count(),
                1,
                "expected exactly one occurrence of {landmark:?}"
            );
        }
    }

    #[test]
    fn magic_is_popped_before_info_pointer() {
        let mut e = AsmEmitter::new();
        emit_bootstrap(&mut e);
        let text = e.finish();

        // eax (magic) is pushed last so `pop rsi` recovers it first.
        let push_eax = text.find("push eax").unwrap();
        let push_ebx = text.find("push ebx").unwrap();
        assert!(push_ebx < push_eax);

        let pop_rsi = text.find("pop rsi").unwrap();
        let pop_rdx = text.find("pop rdx").unwrap();
        assert!(pop_rsi < pop_rdx);
    }

    #[test]
    fn checksum_value_matches_the_known_header() {
        assert_eq!(multiboot2_checksum(), 0x17AD_AF1A);
    }
}
