use std::collections::HashSet;
use std::fs;

use cascade_bench::arena::ArenaRunner;
use cascade_bench::config::BenchmarkConfig;
use tempfile::tempdir;

fn load_config(output_dir: &std::path::Path) -> BenchmarkConfig {
    let yaml = format!(
        r#"
run_id: "test_smoke"
games:
  seed: 4242
  count: 2
  agents_per_table: 3
  hand_size: 4
  max_turns: 40
agents:
  - name: "easy"
    difficulty: "easy"
    iterations: 24
  - name: "normal"
    difficulty: "normal"
    iterations: 24
  - name: "hard"
    difficulty: "hard"
    iterations: 24
outputs:
  jsonl: "{jsonl}"
  summary_json: "{summary}"
logging:
  enable_structured: false
"#,
        jsonl = output_dir.join("games.jsonl").display(),
        summary = output_dir.join("summary.json").display(),
    );

    let mut cfg: BenchmarkConfig = serde_yaml::from_str(&yaml).expect("valid yaml");
    cfg.validate().expect("config validates");
    cfg
}

#[test]
fn self_play_smoke_test_writes_rows_and_summary() {
    let dir = tempdir().expect("temp dir");
    let config = load_config(dir.path());
    let outputs = config.resolved_outputs();

    let runner = ArenaRunner::new(config, outputs).expect("runner created");
    let summary = runner.run().expect("self-play completes");

    assert_eq!(summary.games_played, 2);
    assert_eq!(summary.rows_written, 2);

    let jsonl = fs::read_to_string(&summary.jsonl_path).expect("jsonl readable");
    let rows: Vec<serde_json::Value> = jsonl
        .lines()
        .map(|line| serde_json::from_str(line).expect("row decodes to JSON"))
        .collect();
    assert_eq!(rows.len(), 2);
    for (index, row) in rows.iter().enumerate() {
        assert_eq!(row["run_id"], "test_smoke");
        assert_eq!(row["game_index"], index);
        assert_eq!(row["seating"].as_array().map(Vec::len), Some(3));
        assert_eq!(row["scores"].as_array().map(Vec::len), Some(3));
        assert!(row["reason"].is_string(), "game {index} finished");
        assert!(row["turns"].as_u64().is_some_and(|turns| turns <= 40));
    }
    let seatings: HashSet<String> = rows.iter().map(|row| row["seating"].to_string()).collect();
    assert_eq!(seatings.len(), 2, "seats rotate between games");

    assert!(summary.summary_path.exists(), "summary json missing");
    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&summary.summary_path).expect("summary readable"))
            .expect("summary decodes");
    assert_eq!(written["games"], 2);
    assert_eq!(written["agents"].as_array().map(Vec::len), Some(3));
    let seats_played: u64 = summary.summary.agents.iter().map(|a| a.games as u64).sum();
    assert_eq!(seats_played, 6);
}

#[test]
fn equal_seeds_replay_the_same_games() {
    let strip = |text: String| -> Vec<serde_json::Value> {
        text.lines()
            .map(|line| {
                let mut value: serde_json::Value = serde_json::from_str(line).expect("row");
                if let Some(obj) = value.as_object_mut() {
                    obj.remove("speed_ms_decision");
                }
                value
            })
            .collect()
    };

    let mut runs = Vec::new();
    for _ in 0..2 {
        let dir = tempdir().expect("temp dir");
        let config = load_config(dir.path());
        let outputs = config.resolved_outputs();
        let summary = ArenaRunner::new(config, outputs)
            .expect("runner created")
            .run()
            .expect("self-play completes");
        runs.push(strip(fs::read_to_string(&summary.jsonl_path).expect("jsonl readable")));
    }
    assert_eq!(runs[0], runs[1]);
}
