//! Splitting of cell text into per-booking line groups.

use super::classify::is_time_range;

/// Splits the cleaned text of one cell into groups of lines, one group per
/// booking.
///
/// A normal cell is a single booking. A clash cell packs several
/// overlapping bookings into one cell behind a "Clash" banner; each booking
/// starts at its own time-range line. Lines ahead of the first time range
/// in a clash cell are dropped since they cannot carry a booking.
pub fn split_blocks(cell_text: &str, is_clash_cell: bool) -> Vec<Vec<String>> {
    let lines = cell_text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty());

    if !is_clash_cell {
        let group: Vec<String> = lines.map(str::to_string).collect();
        return if group.is_empty() { Vec::new() } else { vec![group] };
    }

    let mut groups = Vec::new();
    let mut current: Option<Vec<String>> = None;

    for line in lines {
        if is_clash_banner(line) {
            continue;
        }
        if is_time_range(line) {
            if let Some(done) = current.take() {
                groups.push(done);
            }
            current = Some(vec![line.to_string()]);
        } else if let Some(group) = current.as_mut() {
            group.push(line.to_string());
        }
    }

    if let Some(done) = current {
        groups.push(done);
    }
    groups
}

/// `Clash!`, `** CLASH **`, `clash - 2 bookings` and the like.
fn is_clash_banner(line: &str) -> bool {
    let word: String = line
        .chars()
        .skip_while(|c| !c.is_alphanumeric())
        .take_while(|c| c.is_alphanumeric())
        .collect();
    word.eq_ignore_ascii_case("clash")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_cell_is_one_group() {
        let text = "  09:00 - 10:00\n\nCO2401 - Software Development\n  King, John \n";
        let groups = split_blocks(text, false);
        assert_eq!(
            groups,
            vec![vec![
                "09:00 - 10:00".to_string(),
                "CO2401 - Software Development".to_string(),
                "King, John".to_string(),
            ]]
        );
    }

    #[test]
    fn test_plain_empty_cell_has_no_groups() {
        assert!(split_blocks(" \n\n", false).is_empty());
    }

    #[test]
    fn test_clash_cell_groups_per_time_header() {
        let text = "Clash!\n\
                    10:00 - 13:00\n\
                    CO3519 - Artificial Intelligence\n\
                    Lecture (On Campus)\n\
                    10:00 - 13:00\n\
                    CO3808 - Project\n\
                    Dimitriadou, Athanasia\n\
                    11:00 - 12:00\n\
                    MA1101 - Calculus";
        let groups = split_blocks(text, true);

        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0][0], "10:00 - 13:00");
        assert_eq!(groups[1][2], "Dimitriadou, Athanasia");
        assert_eq!(groups[2], vec!["11:00 - 12:00", "MA1101 - Calculus"]);
        assert!(groups.iter().flatten().all(|line| !line.contains("Clash")));
    }

    #[test]
    fn test_clash_banner_variants() {
        assert!(is_clash_banner("Clash!"));
        assert!(is_clash_banner("** CLASH **"));
        assert!(!is_clash_banner("Clashford, Ann"));
        assert!(!is_clash_banner("10:00 - 11:00"));
    }

    #[test]
    fn test_clash_lines_before_first_header_dropped() {
        let groups = split_blocks("stray text\n09:00 - 10:00\nCO1000 - Intro", true);
        assert_eq!(groups, vec![vec!["09:00 - 10:00", "CO1000 - Intro"]]);
    }
}
