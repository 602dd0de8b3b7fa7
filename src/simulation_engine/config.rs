use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::Path;

use rand::Rng;
use thiserror::Error;

use crate::simulation_engine::intersections::Intersection;

/// A train declaration from the configuration: numeric id plus the ordered
/// route of intersection ids it will traverse.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub id: u32,
    pub route: Vec<String>,
}

/// The parsed scenario: every intersection with its capacity, and every
/// train with its route.
#[derive(Debug, Clone, Default)]
pub struct SimulationConfig {
    pub intersections: Vec<Intersection>,
    pub trains: Vec<TrainConfig>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed line {line_no} in {path}: {line:?}")]
    MalformedLine {
        path: String,
        line_no: usize,
        line: String,
    },
    #[error("invalid capacity {value:?} for intersection {id}")]
    InvalidCapacity { id: String, value: String },
    #[error("duplicate intersection id {id}")]
    DuplicateIntersection { id: String },
    #[error("invalid train id {id:?}")]
    InvalidTrainId { id: String },
    #[error("duplicate train id {id}")]
    DuplicateTrain { id: u32 },
    #[error("train {train_id} has an empty route")]
    EmptyRoute { train_id: u32 },
    #[error("train {train_id} route references unknown intersection {intersection}")]
    UnknownIntersection { train_id: u32, intersection: String },
}

impl SimulationConfig {
    /// Loads and validates a scenario from the two text files. Any
    /// violation is fatal: the caller exits before serving a single
    /// request.
    pub fn load<P: AsRef<Path>>(
        intersections_path: P,
        trains_path: P,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            intersections: parse_intersections(intersections_path.as_ref())?,
            trains: parse_trains(trains_path.as_ref())?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut intersection_ids = HashSet::new();
        for intersection in &self.intersections {
            if intersection.capacity < 1 {
                return Err(ConfigError::InvalidCapacity {
                    id: intersection.id.clone(),
                    value: intersection.capacity.to_string(),
                });
            }
            if !intersection_ids.insert(intersection.id.as_str()) {
                return Err(ConfigError::DuplicateIntersection {
                    id: intersection.id.clone(),
                });
            }
        }

        let mut train_ids = HashSet::new();
        for train in &self.trains {
            if !train_ids.insert(train.id) {
                return Err(ConfigError::DuplicateTrain { id: train.id });
            }
            if train.route.is_empty() {
                return Err(ConfigError::EmptyRoute { train_id: train.id });
            }
            for leg in &train.route {
                if !intersection_ids.contains(leg.as_str()) {
                    return Err(ConfigError::UnknownIntersection {
                        train_id: train.id,
                        intersection: leg.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Parses lines of the form `IntersectionA:2` (id, capacity). Blank lines
/// are skipped.
fn parse_intersections(path: &Path) -> Result<Vec<Intersection>, ConfigError> {
    let text = read_file(path)?;
    let mut intersections = Vec::new();
    for (line_no, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let Some((id, capacity_str)) = line.split_once(':') else {
            return Err(malformed(path, line_no + 1, line));
        };
        let id = id.trim();
        if id.is_empty() {
            return Err(malformed(path, line_no + 1, line));
        }
        let capacity = capacity_str
            .trim()
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidCapacity {
                id: id.to_string(),
                value: capacity_str.trim().to_string(),
            })?;
        intersections.push(Intersection::new(id, capacity));
    }
    Ok(intersections)
}

/// Parses lines of the form `Train1:IntersectionA,IntersectionB`. The
/// numeric train id is the part after the `Train` prefix (a bare number
/// is also accepted).
fn parse_trains(path: &Path) -> Result<Vec<TrainConfig>, ConfigError> {
    let text = read_file(path)?;
    let mut trains = Vec::new();
    for (line_no, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let Some((name, route_str)) = line.split_once(':') else {
            return Err(malformed(path, line_no + 1, line));
        };
        let id = parse_train_id(name.trim())?;
        let route: Vec<String> = route_str
            .split(',')
            .map(|leg| leg.trim().to_string())
            .filter(|leg| !leg.is_empty())
            .collect();
        trains.push(TrainConfig { id, route });
    }
    Ok(trains)
}

fn parse_train_id(name: &str) -> Result<u32, ConfigError> {
    let digits = name.strip_prefix("Train").unwrap_or(name);
    digits.parse::<u32>().map_err(|_| ConfigError::InvalidTrainId {
        id: name.to_string(),
    })
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn malformed(path: &Path, line_no: usize, line: &str) -> ConfigError {
    ConfigError::MalformedLine {
        path: path.display().to_string(),
        line_no,
        line: line.to_string(),
    }
}

/// Generates a random scenario: capacities between 1 and 3, routes of up
/// to four hops with no immediate repeats.
pub fn random_config(intersection_count: usize, train_count: usize) -> SimulationConfig {
    let mut rng = rand::rng();

    let mut intersections = Vec::new();
    for i in 0..intersection_count {
        let letter = (b'A' + (i % 26) as u8) as char;
        let id = if i < 26 {
            format!("Intersection{}", letter)
        } else {
            format!("Intersection{}{}", letter, i / 26)
        };
        intersections.push(Intersection::new(&id, rng.random_range(1..=3)));
    }

    let mut trains = Vec::new();
    for t in 0..train_count {
        let route_len = rng.random_range(1..=intersection_count.min(4));
        let mut route = Vec::new();
        let mut last = None;
        for _ in 0..route_len {
            let mut pick = rng.random_range(0..intersection_count);
            if Some(pick) == last && intersection_count > 1 {
                pick = (pick + 1) % intersection_count;
            }
            route.push(intersections[pick].id.clone());
            last = Some(pick);
        }
        trains.push(TrainConfig {
            id: t as u32 + 1,
            route,
        });
    }

    SimulationConfig {
        intersections,
        trains,
    }
}

/// Writes a scenario back out in the text format `load` reads, under the
/// given directory as `intersections.txt` and `trains.txt`.
pub fn write_files(config: &SimulationConfig, dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;

    let mut intersections_file = fs::File::create(dir.join("intersections.txt"))?;
    for intersection in &config.intersections {
        writeln!(
            intersections_file,
            "{}:{}",
            intersection.id, intersection.capacity
        )?;
    }

    let mut trains_file = fs::File::create(dir.join("trains.txt"))?;
    for train in &config.trains {
        writeln!(trains_file, "Train{}:{}", train.id, train.route.join(","))?;
    }
    Ok(())
}
