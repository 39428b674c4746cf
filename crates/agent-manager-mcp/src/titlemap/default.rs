use std::collections::HashMap;

pub fn default_titles() -> HashMap<String, String> {
    let mut m = HashMap::new();
    for (folder, title) in [
        ("00-agent-management", "00 Agent Management"),
        ("00-orchestration", "00 Orchestration"),
        ("00-quality-assurance", "00 Quality Assurance"),
        ("01-ideation", "01 Discovery"),
        ("02-discovery", "02 PRD"),
        ("03-validation", "03 Validation"),
        ("04-audit", "04 Audit"),
        ("05-task-decomposition", "05 Tasking"),
        ("06-09-implementation", "06 Build"),
        ("10-testing", "07 Testing"),
        ("11-12-deployment", "08 Deployment"),
        // Expert lineage
        ("signal-processing", "Military & Defense Systems"),
        ("backend-ecosystems", "Languages"),
        ("blockchain-web3", "Blockchain"),
    ] {
        m.insert(folder.to_string(), title.to_string());
    }
    m
}
