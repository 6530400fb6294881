//! Process enumeration shared by every desktop backend.

use sysinfo::{ProcessesToUpdate, System};

use super::ProcessInfo;

/// Lists running processes in ascending pid order.
pub fn list_processes() -> Vec<ProcessInfo> {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);

    let mut processes: Vec<ProcessInfo> = system
        .processes()
        .iter()
        .map(|(pid, process)| ProcessInfo {
            pid: pid.as_u32(),
            name: process.name().to_string_lossy().into_owned(),
        })
        .collect();

    // HashMap order is arbitrary; pid order keeps "first match" stable
    processes.sort_by_key(|p| p.pid);
    processes
}

/// First process whose name contains `fragment`, ignoring case.
pub fn find_process<'a>(processes: &'a [ProcessInfo], fragment: &str) -> Option<&'a ProcessInfo> {
    let needle = fragment.to_lowercase();
    processes
        .iter()
        .find(|p| p.name.to_lowercase().contains(&needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn process(pid: u32, name: &str) -> ProcessInfo {
        ProcessInfo {
            pid,
            name: name.to_string(),
        }
    }

    #[test]
    fn test_find_process_is_case_insensitive_substring() {
        let processes = vec![
            process(10, "explorer.exe"),
            process(20, "squadgame.exe"),
            process(30, "SquadGame.exe"),
        ];
        let found = find_process(&processes, "SquadGame.exe").unwrap();
        assert_eq!(found.pid, 20);

        let found = find_process(&processes, "squad").unwrap();
        assert_eq!(found.pid, 20);
    }

    #[test]
    fn test_find_process_none() {
        let processes = vec![process(10, "explorer.exe")];
        assert!(find_process(&processes, "SquadGame").is_none());
    }

    #[test]
    fn test_list_processes_is_sorted() {
        let processes = list_processes();
        assert!(!processes.is_empty());
        assert!(processes.windows(2).all(|w| w[0].pid <= w[1].pid));
    }
}
