use super::util::Result;

pub fn readable_size(bytes: usize) -> (f64, &'static str) {
    let units: Vec<(f64, &'static str)> = vec![
        (1.0, "B"),
        (1024.0, "KiB"),
        (1024.0 * 1024.0, "MiB"),
        (1024.0 * 1024.0 * 1024.0, "GiB"),
        (1024.0 * 1024.0 * 1024.0 * 1024.0, "TiB"),
    ];

    let value = bytes as f64;
    let mut unit = units[0];
    for next in units.iter().skip(1) {
        if value >= next.0 {
            unit = *next;
        } else {
            break;
        }
    }

    (value / unit.0, unit.1)
}

#[cfg(target_os = "macos")]
pub fn peak_memory_usage() -> Result<usize> {
    unsafe {
        let mut rusage: libc::rusage = std::mem::zeroed();
        let retval = libc::getrusage(libc::RUSAGE_SELF, &mut rusage as *mut _);
        match retval {
            0 => Ok(rusage.ru_maxrss as usize),
            _ => Err(crate::varanno_error!("libc::getrusage call failed")),
        }
    }
}

#[cfg(not(target_os = "macos"))]
pub fn peak_memory_usage() -> Result<usize> {
    Err(crate::varanno_error!(
        "No peak_memory_usage implementation for this OS"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readable_size_picks_largest_unit() {
        assert_eq!(readable_size(512), (512.0, "B"));
        assert_eq!(readable_size(2048), (2.0, "KiB"));
        assert_eq!(readable_size(3 * 1024 * 1024), (3.0, "MiB"));
    }
}
