//! Script string marshaling
//!
//! Pawn strings come in two layouts. Unpacked strings hold one character
//! per cell. Packed strings hold four bytes per cell, first character in the
//! most significant byte, and are recognized by a first cell above
//! `UNPACKED_MAX`. Both end at a zero character.

use super::Cell;

/// Largest value the first cell of an unpacked string can have
const UNPACKED_MAX: u32 = 0x00FF_FFFF;

/// Decode the cells of a string. Decoding stops at the terminator if the
/// slice holds one.
pub fn decode(cells: &[Cell]) -> String {
    match cells.first() {
        Some(&first) if first as u32 > UNPACKED_MAX => cells
            .iter()
            .flat_map(|&c| (c as u32).to_be_bytes())
            .take_while(|&b| b != 0)
            .map(char::from)
            .collect(),
        _ => cells
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| cell_to_char(c))
            .collect(),
    }
}

/// Sign-extended bytes are folded back into Latin-1
fn cell_to_char(cell: Cell) -> char {
    if cell < 0 {
        char::from((cell & 0xFF) as u8)
    } else {
        char::from_u32(cell as u32).unwrap_or(char::REPLACEMENT_CHARACTER)
    }
}

/// Encode `text` unpacked for a buffer of `maxlen` cells: at most
/// `maxlen - 1` characters followed by the terminator. Empty for `maxlen`
/// 0.
pub fn encode(text: &str, maxlen: usize) -> Vec<Cell> {
    if maxlen == 0 {
        return Vec::new();
    }
    let mut cells: Vec<Cell> = text.chars().take(maxlen - 1).map(|c| c as Cell).collect();
    cells.push(0);
    cells
}

/// Read the zero-terminated string at `ptr`.
///
/// # Safety
///
/// `ptr` must be null or point to a terminated string in script memory.
pub unsafe fn read_string(ptr: *const Cell) -> String {
    if ptr.is_null() {
        return String::new();
    }

    let packed = unsafe { *ptr } as u32 > UNPACKED_MAX;
    let mut len = 0;
    loop {
        let cell = unsafe { *ptr.add(len) };
        len += 1;
        let terminated = if packed {
            (cell as u32).to_be_bytes().contains(&0)
        } else {
            cell == 0
        };
        if terminated {
            break;
        }
    }

    decode(unsafe { std::slice::from_raw_parts(ptr, len) })
}

/// Write `text` into a script buffer of `maxlen` cells. Returns the number
/// of characters written, terminator excluded.
///
/// # Safety
///
/// `dest` must point to at least `maxlen` writable cells.
pub unsafe fn write_string(dest: *mut Cell, text: &str, maxlen: usize) -> usize {
    let cells = encode(text, maxlen);
    if dest.is_null() || cells.is_empty() {
        return 0;
    }
    unsafe { std::ptr::copy_nonoverlapping(cells.as_ptr(), dest, cells.len()) };
    cells.len() - 1
}
