//! Parsing of damaged, inconsistent, wrapped and oversized containers.

use dexscope::{prelude::*, utils::checksum};

/// Offset of `string_ids_size` in the header.
const STRING_IDS_SIZE: usize = 0x38;
/// Offset of `endian_tag` in the header.
const ENDIAN_TAG: usize = 0x28;
/// Offset of `map_off` in the header.
const MAP_OFFSET: usize = 0x34;

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn small_container() -> Result<Vec<u8>> {
    let mut dex = DexFile::new();
    dex.intern_field("LMain;", "counter", "J")?;
    dex.place()?;
    dex.encode()
}

#[test]
fn empty_input_is_rejected() {
    assert!(matches!(DexFile::from_bytes(&[]), Err(Error::Empty)));
}

#[test]
fn unknown_magic_is_a_format_error() -> Result<()> {
    let mut bytes = small_container()?;
    bytes[4..7].copy_from_slice(b"999");
    assert!(matches!(DexFile::from_bytes(&bytes), Err(Error::Format(_))));
    Ok(())
}

#[test]
fn big_endian_tag_is_a_format_error() -> Result<()> {
    let mut bytes = small_container()?;
    bytes[ENDIAN_TAG..ENDIAN_TAG + 4].copy_from_slice(&0x1234_5678_u32.to_be_bytes());
    let Err(error) = DexFile::from_bytes(&bytes) else {
        panic!("damaged container parsed");
    };
    assert!(matches!(error, Error::Format(_)));
    assert!(error.to_string().contains("big-endian"));
    Ok(())
}

#[test]
fn truncated_input_is_a_format_error() -> Result<()> {
    let bytes = small_container()?;
    let truncated = &bytes[..bytes.len() - 8];
    assert!(matches!(DexFile::from_bytes(truncated), Err(Error::Format(_))));
    Ok(())
}

#[test]
fn header_and_map_must_agree() -> Result<()> {
    let mut bytes = small_container()?;
    let declared = read_u32(&bytes, STRING_IDS_SIZE);
    bytes[STRING_IDS_SIZE..STRING_IDS_SIZE + 4].copy_from_slice(&(declared + 1).to_le_bytes());

    let Err(error) = DexFile::from_bytes(&bytes) else {
        panic!("damaged container parsed");
    };
    assert!(matches!(error.root(), Error::Consistency(_)));
    assert!(error.to_string().contains("string_id_item"));
    Ok(())
}

#[test]
fn oversized_section_count_is_a_format_error() -> Result<()> {
    let mut bytes = small_container()?;
    bytes[STRING_IDS_SIZE..STRING_IDS_SIZE + 4].copy_from_slice(&u32::MAX.to_le_bytes());

    let map = read_u32(&bytes, MAP_OFFSET) as usize;
    let entries = read_u32(&bytes, map) as usize;
    let entry = (0..entries)
        .map(|i| map + 4 + 12 * i)
        .find(|&at| u16::from_le_bytes([bytes[at], bytes[at + 1]]) == 0x0001)
        .expect("map lists the string ids");
    bytes[entry + 4..entry + 8].copy_from_slice(&u32::MAX.to_le_bytes());

    let Err(error) = DexFile::from_bytes(&bytes) else {
        panic!("damaged container parsed");
    };
    assert!(matches!(error, Error::Format(_)));
    assert!(error.to_string().contains("string_id_item"));
    Ok(())
}

#[test]
fn checksum_mismatch_is_reported_but_not_fatal() -> Result<()> {
    let mut bytes = small_container()?;
    checksum::verify(&bytes)?;

    // flip one byte of the stored signature
    bytes[12] ^= 0xFF;
    assert!(matches!(checksum::verify(&bytes), Err(Error::Consistency(_))));

    let mut parsed = DexFile::from_bytes_with(&bytes, DexOptions::in_place())?;
    assert_eq!(parsed.fields().len(), 1);

    // re-encoding repairs signature and checksum
    parsed.place()?;
    let repaired = parsed.encode()?;
    checksum::verify(&repaired)?;
    bytes[12] ^= 0xFF;
    assert_eq!(repaired, bytes);
    Ok(())
}

#[test]
fn optimized_wrapper_is_skipped() -> Result<()> {
    let dex_bytes = small_container()?;
    let length = dex_bytes.len() as u32;

    let mut wrapped = Vec::new();
    wrapped.extend_from_slice(b"dey\n035\0");
    for value in [40, length, 40 + length, 4, 44 + length, 0, 0, 0] {
        wrapped.extend_from_slice(&u32::to_le_bytes(value));
    }
    wrapped.extend_from_slice(&dex_bytes);
    wrapped.extend_from_slice(&[0xAA; 4]);

    let input = Input::from_mem(wrapped.clone())?;
    assert_eq!(input.dex_data(), dex_bytes.as_slice());
    assert_eq!(input.data().len(), wrapped.len());

    let mut parsed = DexFile::from_input(&input, DexOptions::in_place())?;
    let odex = parsed.odex_header().copied().expect("wrapper is recognized");
    assert_eq!(odex.dex_offset, 40);
    assert_eq!(odex.dex_length, length);
    assert_eq!(odex.deps_length, 4);
    assert_eq!(odex.version_tag(), b"035");

    parsed.place()?;
    assert_eq!(parsed.encode()?, dex_bytes);
    Ok(())
}

#[test]
fn wrapper_overlapping_its_dex_is_rejected() -> Result<()> {
    let dex_bytes = small_container()?;
    let length = dex_bytes.len() as u32;

    let mut wrapped = Vec::new();
    wrapped.extend_from_slice(b"dey\n036\0");
    for value in [40, length, 48, 4, 0, 0, 0, 0] {
        wrapped.extend_from_slice(&u32::to_le_bytes(value));
    }
    wrapped.extend_from_slice(&dex_bytes);

    assert!(matches!(Input::from_mem(wrapped), Err(Error::Format(_))));
    Ok(())
}

#[test]
fn version_is_carried_through() -> Result<()> {
    let mut dex = DexFile::with_options(DexOptions::natural().with_version(DexVersion::V036));
    dex.intern_string("v036")?;
    dex.place()?;
    let bytes = dex.encode()?;
    assert_eq!(&bytes[..8], b"dex\n036\0");

    let parsed = DexFile::from_bytes(&bytes)?;
    assert_eq!(parsed.version(), DexVersion::V036);
    Ok(())
}

/// Fills the string table past 16-bit indices; the returned string sorts last.
fn many_strings(dex: &mut DexFile) -> Result<Id<StringIdItem>> {
    for index in 0..=0xFFFF_u32 {
        dex.intern_string(&format!("s{index:05}"))?;
    }
    dex.intern_string("zzz")
}

#[test]
fn narrow_string_operand_overflows_without_fixing() -> Result<()> {
    let mut dex = DexFile::with_options(DexOptions::natural().with_fix_instructions(false));
    let last = many_strings(&mut dex)?;
    dex.intern(CodeItem::new(
        1,
        0,
        0,
        vec![
            0x001A, 0x0000, // const-string v0, "zzz"
            0x000E, // return-void
        ],
        vec![Reference::String(last)],
    )?)?;
    dex.place()?;
    assert_eq!(dex.index_of(last)?, 0x1_0000);

    let error = dex.encode().unwrap_err();
    assert!(matches!(error.root(), Error::Overflow(_)));
    assert!(error.to_string().starts_with("code_item @0x"));
    Ok(())
}

#[test]
fn narrow_string_operand_is_widened() -> Result<()> {
    let mut dex = DexFile::new();
    let last = many_strings(&mut dex)?;
    let debug = dex.intern(DebugInfoItem {
        line_start: 3,
        parameter_names: vec![],
        instructions: vec![
            DebugInstruction::advance_pc(2),
            DebugInstruction::advance_line(1),
        ],
    })?;
    let mut code = CodeItem::new(
        1,
        0,
        0,
        vec![
            0x001A, 0x0000, // const-string v0, "zzz"
            0x000E, // return-void
        ],
        vec![Reference::String(last)],
    )?;
    code.debug_info = Some(debug);
    code.tries.push(TryItem {
        start_address: 0,
        unit_count: 2,
        handler: 0,
    });
    code.handlers.push(CatchHandler {
        catches: vec![],
        catch_all: Some(2),
    });
    let code = dex.intern(code)?;
    dex.place()?;
    assert_eq!(dex.code_items()[code].instructions().len(), 4);
    let bytes = dex.encode()?;

    let parsed = DexFile::from_bytes(&bytes)?;
    let (_, item) = parsed.code_items().iter().next().expect("one code item");
    assert_eq!(item.instructions(), &[0x001B_u16, 0x0000, 0x0001, 0x000E]);
    assert_eq!(item.tries[0].unit_count, 3);
    assert_eq!(item.handlers[0].catch_all, Some(3));
    let debug = item.debug_info.expect("debug info survives");
    assert_eq!(
        parsed.debug_infos()[debug].instructions[0],
        DebugInstruction::advance_pc(3)
    );
    Ok(())
}

#[test]
fn wide_string_operand_fits() -> Result<()> {
    let mut dex = DexFile::new();
    let last = many_strings(&mut dex)?;
    dex.intern(CodeItem::new(
        1,
        0,
        0,
        vec![
            0x001B, 0x0000, 0x0000, // const-string/jumbo v0, "zzz"
            0x000E, // return-void
        ],
        vec![Reference::String(last)],
    )?)?;
    dex.place()?;
    let bytes = dex.encode()?;

    let parsed = DexFile::from_bytes(&bytes)?;
    let code = &parsed.code_items()[parsed.code_items().ids()[0]];
    assert_eq!(code.instructions()[1..3], [0x0000_u16, 0x0001]);
    Ok(())
}
