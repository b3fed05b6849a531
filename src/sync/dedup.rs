use std::collections::HashMap;

use crate::db::RecordStore;
use crate::errors::AppError;
use crate::models::employee::{DedupReport, DuplicateKey, EmployeeRecord};

/// Ids to delete so that every (name, designation, department) group keeps
/// only its most recently created record. Ties on the timestamp keep the
/// higher id. Input order does not matter; the result is sorted.
pub fn duplicate_ids(employees: &[EmployeeRecord]) -> Vec<i64> {
    let mut keepers: HashMap<DuplicateKey<'_>, &EmployeeRecord> = HashMap::new();
    let mut extras = Vec::new();

    for employee in employees {
        match keepers.get_mut(&employee.key()) {
            None => {
                keepers.insert(employee.key(), employee);
            }
            Some(keeper) => {
                if (employee.created_at, employee.id) > (keeper.created_at, keeper.id) {
                    extras.push(keeper.id);
                    *keeper = employee;
                } else {
                    extras.push(employee.id);
                }
            }
        }
    }

    extras.sort_unstable();
    extras
}

/// Collapses every duplicate group in `store` down to its newest record.
pub async fn remove_duplicates(store: &dyn RecordStore) -> Result<DedupReport, AppError> {
    log::info!("Starting duplicate removal on {} backend", store.backend());

    let employees = store.fetch_all().await?;
    if employees.is_empty() {
        return Ok(DedupReport { removed: 0, message: "No employees found".to_string() });
    }

    let ids = duplicate_ids(&employees);
    if ids.is_empty() {
        return Ok(DedupReport { removed: 0, message: "No duplicates found".to_string() });
    }

    let deleted = store.delete_many(&ids).await?;
    if deleted as usize != ids.len() {
        // Something else deleted part of the group in the meantime
        log::warn!("Expected to remove {} duplicates, backend removed {}", ids.len(), deleted);
    }

    log::info!("Removed {} duplicate employees", ids.len());
    Ok(DedupReport {
        removed: ids.len(),
        message: format!("Successfully removed {} duplicate employees", ids.len()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    use crate::models::employee::NewEmployee;

    fn employee(id: i64, name: &str, designation: &str, department: &str, minute: i64) -> EmployeeRecord {
        let created_at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap() + Duration::minutes(minute);
        NewEmployee::new(name, designation, department).into_record(id, created_at)
    }

    #[test]
    fn keeps_newest_of_each_group() {
        let employees = vec![
            employee(1, "Ana", "Engineer", "R&D", 0),
            employee(2, "Ben", "Designer", "Product", 1),
            employee(3, "Ben", "Designer", "Product", 5),
            employee(4, "Ben", "Designer", "Product", 3),
            employee(5, "Cy", "Analyst", "Finance", 2),
            employee(6, "Cy", "Analyst", "Finance", 1),
        ];

        // Groups of sizes [1, 3, 2]
        assert_eq!(duplicate_ids(&employees), vec![2, 4, 6]);
    }

    #[test]
    fn result_does_not_depend_on_input_order() {
        let mut employees = vec![
            employee(1, "Ana", "Engineer", "R&D", 0),
            employee(2, "Ana", "Engineer", "R&D", 2),
            employee(3, "Ana", "Engineer", "R&D", 1),
        ];
        assert_eq!(duplicate_ids(&employees), vec![1, 3]);
        employees.reverse();
        assert_eq!(duplicate_ids(&employees), vec![1, 3]);
    }

    #[test]
    fn timestamp_tie_keeps_higher_id() {
        let employees = vec![
            employee(8, "Ana", "Engineer", "R&D", 0),
            employee(9, "Ana", "Engineer", "R&D", 0),
        ];
        assert_eq!(duplicate_ids(&employees), vec![8]);
    }

    #[test]
    fn separator_characters_do_not_merge_keys() {
        let employees = vec![
            employee(1, "Ana-Engineer", "R&D", "Ops", 0),
            employee(2, "Ana", "Engineer-R&D", "Ops", 1),
        ];
        assert!(duplicate_ids(&employees).is_empty());
    }

    #[test]
    fn keys_are_case_sensitive() {
        let employees = vec![
            employee(1, "ana", "Engineer", "R&D", 0),
            employee(2, "Ana", "Engineer", "R&D", 1),
        ];
        assert!(duplicate_ids(&employees).is_empty());
    }
}
