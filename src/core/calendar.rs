use chrono::{Datelike, Duration, NaiveDate};

use super::task::Task;

const MONTHS_FR: [&str; 12] = [
    "janvier", "février", "mars", "avril", "mai", "juin", "juillet", "août", "septembre",
    "octobre", "novembre", "décembre",
];

const WEEKDAY_INITIALS_FR: [&str; 7] = ["L", "M", "M", "J", "V", "S", "D"];

/// Monday through Sunday of the week containing `pivot`.
///
/// Sunday is the last day of its week, not the first of the next one.
pub fn days_of_week(pivot: NaiveDate) -> [NaiveDate; 7] {
    let offset = pivot.weekday().num_days_from_monday() as i64;
    let monday = pivot - Duration::days(offset);
    std::array::from_fn(|i| monday + Duration::days(i as i64))
}

/// Week strip state for the planning screen.
///
/// The selected day is independent of the pivot: navigating weeks leaves the
/// selection where it was, even once it scrolls out of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekSelector {
    pub pivot: NaiveDate,
    pub selected: NaiveDate,
    pub today: NaiveDate,
}

impl Default for WeekSelector {
    fn default() -> Self {
        Self::new(chrono::Local::now().date_naive())
    }
}

impl WeekSelector {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            pivot: today,
            selected: today,
            today,
        }
    }

    pub fn days(&self) -> [NaiveDate; 7] {
        days_of_week(self.pivot)
    }

    pub fn previous_week(&mut self) {
        self.pivot = self
            .pivot
            .checked_sub_signed(Duration::days(7))
            .unwrap_or(self.pivot);
    }

    pub fn next_week(&mut self) {
        self.pivot = self
            .pivot
            .checked_add_signed(Duration::days(7))
            .unwrap_or(self.pivot);
    }

    pub fn select_date(&mut self, date: NaiveDate) {
        self.selected = date;
    }

    pub fn is_today(&self, date: NaiveDate) -> bool {
        date == self.today
    }

    pub fn is_selected(&self, date: NaiveDate) -> bool {
        date == self.selected
    }

    /// Whether the selected day is part of the displayed week.
    pub fn selection_in_view(&self) -> bool {
        self.days().contains(&self.selected)
    }

    pub fn tasks_for_selected<'a>(&self, tasks: &'a [Task]) -> Vec<&'a Task> {
        tasks.iter().filter(|t| t.is_on(self.selected)).collect()
    }

    /// "mars 2024", taken from the pivot.
    pub fn month_year_label(&self) -> String {
        format!(
            "{} {}",
            MONTHS_FR[self.pivot.month0() as usize],
            self.pivot.year()
        )
    }
}

pub fn weekday_initial(date: NaiveDate) -> &'static str {
    WEEKDAY_INITIALS_FR[date.weekday().num_days_from_monday() as usize]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, Weekday};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn task_on(id: &str, date: NaiveDate) -> Task {
        Task::new(
            id,
            date,
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            "Visite",
        )
    }

    #[test]
    fn wednesday_pivot() {
        let week = days_of_week(d(2024, 3, 13));
        assert_eq!(week[0], d(2024, 3, 11));
        assert_eq!(week[6], d(2024, 3, 17));
    }

    #[test]
    fn sunday_belongs_to_preceding_week() {
        let week = days_of_week(d(2024, 3, 17));
        assert_eq!(week[0], d(2024, 3, 11));
        assert_eq!(week[6], d(2024, 3, 17));
    }

    #[test]
    fn every_pivot_yields_monday_to_sunday() {
        let mut pivot = d(2023, 12, 20);
        let end = d(2025, 1, 15);
        while pivot <= end {
            let week = days_of_week(pivot);
            assert_eq!(week[0].weekday(), Weekday::Mon);
            assert_eq!(week[6].weekday(), Weekday::Sun);
            for pair in week.windows(2) {
                assert_eq!(pair[1] - pair[0], Duration::days(1));
            }
            assert!(week.contains(&pivot));
            pivot = pivot.succ_opt().unwrap();
        }
    }

    #[test]
    fn week_navigation_round_trips() {
        // Spans the March DST change in Europe.
        let mut cal = WeekSelector::new(d(2024, 3, 28));
        cal.next_week();
        assert_eq!(cal.pivot, d(2024, 4, 4));
        cal.previous_week();
        assert_eq!(cal.pivot, d(2024, 3, 28));
        cal.previous_week();
        cal.next_week();
        assert_eq!(cal.pivot, d(2024, 3, 28));
    }

    #[test]
    fn selection_is_decoupled_from_pivot() {
        let mut cal = WeekSelector::new(d(2024, 3, 13));
        cal.select_date(d(2024, 3, 14));
        cal.next_week();
        assert_eq!(cal.selected, d(2024, 3, 14));
        assert!(!cal.selection_in_view());
        cal.previous_week();
        assert!(cal.selection_in_view());
        assert!(cal.is_today(d(2024, 3, 13)));
        assert!(cal.is_selected(d(2024, 3, 14)));
    }

    #[test]
    fn tasks_filtered_by_selected_day() {
        let tasks = vec![
            task_on("1", d(2024, 3, 13)),
            task_on("2", d(2024, 3, 14)),
            task_on("3", d(2024, 3, 13)),
        ];
        let mut cal = WeekSelector::new(d(2024, 3, 13));
        let ids: Vec<_> = cal
            .tasks_for_selected(&tasks)
            .iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(ids, vec!["1", "3"]);

        cal.select_date(d(2024, 3, 12));
        assert!(cal.tasks_for_selected(&tasks).is_empty());
    }

    #[test]
    fn labels() {
        let cal = WeekSelector::new(d(2024, 3, 13));
        assert_eq!(cal.month_year_label(), "mars 2024");
        assert_eq!(weekday_initial(d(2024, 3, 14)), "J");
        assert_eq!(weekday_initial(d(2024, 3, 17)), "D");
    }
}
