//! The `adaptest init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    if Path::new("adaptest.toml").exists() {
        println!("adaptest.toml already exists, skipping.");
    } else {
        std::fs::write("adaptest.toml", SAMPLE_CONFIG)?;
        println!("Created adaptest.toml");
    }

    std::fs::create_dir_all("item-banks")?;
    let example_path = Path::new("item-banks/example.toml");
    if example_path.exists() {
        println!("item-banks/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_BANK)?;
        println!("Created item-banks/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Replace the example items with your calibrated bank");
    println!("  2. Run: adaptest validate --bank item-banks/example.toml");
    println!("  3. Run: adaptest simulate --bank item-banks/example.toml --sessions 200");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# adaptest configuration

session_ttl_secs = 3600

[estimator]
method = "mle"
max_iterations = 25
tolerance = 0.001
theta_min = -4.0
theta_max = 4.0

[selector]
top_k = 5
information_tolerance = 0.05
# seed = 42

[scale]
theta_min = -4.0
theta_max = 4.0
score_min = 300
score_max = 850

[defaults]
minItems = 4
maxItems = 12
seTarget = 0.4
timeLimitMs = 3600000
domainTargets = {}
"#;

const EXAMPLE_BANK: &str = r#"[bank]
id = "example"
name = "Example Bank"
metric = "normal-ogive"

[[items]]
id = "num-001"
domain = "numeric"
difficulty = -1.2
discrimination = 1.1
guessing = 0.2
stem = "What is 15% of 80?"
options = ["8", "12", "15", "20"]
correct_answer = "12"

[[items]]
id = "num-002"
domain = "numeric"
difficulty = -0.2
discrimination = 1.3
guessing = 0.2
stem = "Which number comes next: 2, 6, 12, 20, ?"
options = ["24", "28", "30", "32"]
correct_answer = "30"

[[items]]
id = "num-003"
domain = "numeric"
difficulty = 0.9
discrimination = 1.5
guessing = 0.2
stem = "A price rises 20% and then falls 20%. What is the net change?"
options = ["0%", "-4%", "+4%", "-2%"]
correct_answer = "-4%"

[[items]]
id = "num-004"
domain = "numeric"
difficulty = 1.8
discrimination = 1.4
guessing = 0.2
stem = "How many integers between 1 and 100 are divisible by 3 or 5?"
options = ["45", "46", "47", "48"]
correct_answer = "47"

[[items]]
id = "verb-001"
domain = "verbal"
difficulty = -1.5
discrimination = 0.9
guessing = 0.25
stem = "Which word is closest in meaning to 'candid'?"
options = ["Frank", "Secretive", "Hostile", "Timid"]
correct_answer = "Frank"

[[items]]
id = "verb-002"
domain = "verbal"
difficulty = -0.4
discrimination = 1.2
guessing = 0.25
stem = "Choose the antonym of 'scarce'."
options = ["Rare", "Plentiful", "Costly", "Hidden"]
correct_answer = "Plentiful"

[[items]]
id = "verb-003"
domain = "verbal"
difficulty = 0.6
discrimination = 1.4
guessing = 0.25
stem = "Book is to library as painting is to ..."
options = ["Artist", "Canvas", "Gallery", "Frame"]
correct_answer = "Gallery"

[[items]]
id = "verb-004"
domain = "verbal"
difficulty = 1.5
discrimination = 1.2
guessing = 0.25
stem = "Which word means 'to make less severe'?"
options = ["Exacerbate", "Mitigate", "Obviate", "Aggravate"]
correct_answer = "Mitigate"
"#;
