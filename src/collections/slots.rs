// Slot addressing: bank letter plus 1-based program number

use crate::constants::{BANK_COUNT, BANK_LETTERS, BANK_SIZE, SLOT_COUNT};
use crate::error::{LibraryError, Result};

pub fn check_slot(slot: i64) -> Result<u16> {
    if (0..i64::from(SLOT_COUNT)).contains(&slot) {
        Ok(slot as u16)
    } else {
        Err(LibraryError::InvalidSlot(slot))
    }
}

pub fn bank_of(slot: u16) -> u16 {
    slot / BANK_SIZE
}

pub fn program_of(slot: u16) -> u16 {
    slot % BANK_SIZE
}

pub fn slot_from_bank_program(bank: u16, program: u16) -> Result<u16> {
    if bank >= BANK_COUNT || program >= BANK_SIZE {
        return Err(LibraryError::InvalidSlot(i64::from(bank) * i64::from(BANK_SIZE) + i64::from(program)));
    }
    Ok(bank * BANK_SIZE + program)
}

/// `A001` .. `H128`.
pub fn slot_label(slot: u16) -> String {
    let bank = BANK_LETTERS
        .get(usize::from(bank_of(slot)))
        .copied()
        .unwrap_or('?');
    format!("{}{:03}", bank, program_of(slot) + 1)
}

/// Parse `A001`-style labels or a plain slot number.
pub fn parse_slot(input: &str) -> Result<u16> {
    let input = input.trim();
    if let Ok(n) = input.parse::<i64>() {
        return check_slot(n);
    }
    let invalid = || LibraryError::InvalidArgument(format!("not a slot: '{}'", input));
    let mut chars = input.chars();
    let letter = chars.next().ok_or_else(invalid)?.to_ascii_uppercase();
    let bank = BANK_LETTERS.iter().position(|b| *b == letter).ok_or_else(invalid)?;
    let program: u16 = chars.as_str().parse().map_err(|_| invalid())?;
    if program == 0 {
        return Err(invalid());
    }
    slot_from_bank_program(bank as u16, program - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_labels() {
        assert_eq!(slot_label(0), "A001");
        assert_eq!(slot_label(127), "A128");
        assert_eq!(slot_label(128), "B001");
        assert_eq!(slot_label(1023), "H128");
    }

    #[test]
    fn test_parse_slot() {
        assert_eq!(parse_slot("A001").unwrap(), 0);
        assert_eq!(parse_slot("h128").unwrap(), 1023);
        assert_eq!(parse_slot("130").unwrap(), 130);
        assert!(parse_slot("A000").is_err());
        assert!(parse_slot("I001").is_err());
        assert!(parse_slot("1024").is_err());
    }

    #[test]
    fn test_bank_program() {
        assert_eq!(bank_of(300), 2);
        assert_eq!(program_of(300), 44);
        assert_eq!(slot_from_bank_program(2, 44).unwrap(), 300);
        assert!(slot_from_bank_program(8, 0).is_err());
        assert!(matches!(check_slot(-1), Err(LibraryError::InvalidSlot(-1))));
    }
}
