//! Text rendering for sectors and allocator counters

use ldmcompat_common::SECTOR_SIZE;
use ldmcompat_kernel::MemSnapshot;
use std::fmt::Write;

const ROW: usize = 16;

/// Hex dump of one sector, rows labelled with absolute byte offsets
pub fn format_sector(index: u64, data: &[u8]) -> String {
    let base = index * SECTOR_SIZE as u64;
    let mut out = format!("sector {index} (offset {base:#x})\n");
    for (row, chunk) in data.chunks(ROW).enumerate() {
        let ascii: String = chunk
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        let _ = writeln!(
            out,
            "{:08x}  {:<width$}  |{}|",
            base + (row * ROW) as u64,
            hex::encode(chunk),
            ascii,
            width = ROW * 2
        );
    }
    out
}

/// Allocator counters as a table
pub fn format_stats(stats: &MemSnapshot) -> String {
    let mut out = String::from("Memory statistics:\n");
    let rows: [(&str, String); 6] = [
        ("allocations", stats.allocs.to_string()),
        ("frees", stats.frees.to_string()),
        ("bytes in use", stats.size.to_string()),
        ("max bytes", stats.max_size.to_string()),
        ("blocks in use", stats.count.to_string()),
        ("max blocks", stats.max_count.to_string()),
    ];
    for (name, value) in rows {
        let _ = writeln!(out, "  {name:<14}{value:>10}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_sector() {
        let mut data = [0u8; SECTOR_SIZE];
        data[..8].copy_from_slice(b"PRIVHEAD");
        let text = format_sector(6, &data);
        let mut lines = text.lines();

        assert_eq!(lines.next(), Some("sector 6 (offset 0xc00)"));
        assert_eq!(
            lines.next(),
            Some("00000c00  50524956484541440000000000000000  |PRIVHEAD........|")
        );
        assert_eq!(text.lines().count(), 1 + SECTOR_SIZE / ROW);
    }

    #[test]
    fn test_format_stats() {
        let stats = MemSnapshot {
            allocs: 3,
            frees: 3,
            size: 0,
            max_size: 1024,
            count: 0,
            max_count: 2,
        };
        let text = format_stats(&stats);
        assert!(text.starts_with("Memory statistics:\n"));
        assert!(text.contains(&format!("  allocations{}3\n", " ".repeat(12))));
        assert!(text.contains(&format!("  max bytes{}1024\n", " ".repeat(11))));
        assert_eq!(text.lines().count(), 7);
    }
}
