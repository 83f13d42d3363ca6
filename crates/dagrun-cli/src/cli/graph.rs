//! `dagrun graph`: print the validated execution order without running.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use dagrun_core::graph::{ActionBuilder, ActionGraph};
use dagrun_types::config::PipelineConfig;
use serde::Serialize;

use crate::housing::HousingPipeline;

#[derive(Debug, Serialize)]
struct PlannedAction {
    wave: usize,
    name: String,
    job_type: String,
    job_group: String,
    code_version: String,
    parents: Vec<String>,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

fn plan(graph: &ActionGraph) -> Result<Vec<PlannedAction>> {
    let mut planned = Vec::with_capacity(graph.len());
    for (wave, ids) in graph.layers()?.into_iter().enumerate() {
        for id in ids {
            let Some(node) = graph.get(&id) else {
                continue;
            };
            planned.push(PlannedAction {
                wave,
                name: id.to_string(),
                job_type: node.meta().job_type.clone(),
                job_group: node.meta().job_group.clone(),
                code_version: node.code_version().to_string(),
                parents: node.parents().iter().map(|p| p.to_string()).collect(),
                inputs: node.io().inputs.clone(),
                outputs: node.io().outputs.clone(),
            });
        }
    }
    Ok(planned)
}

pub fn show_graph(set: &[String], json: bool) -> Result<()> {
    let config = PipelineConfig::from_assignments(set).map_err(anyhow::Error::msg)?;
    let graph = HousingPipeline.to_graph(&config)?;
    let planned = plan(&graph)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&planned)?);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Wave"),
            Cell::new("Action").fg(Color::Cyan),
            Cell::new("Job type"),
            Cell::new("Group"),
            Cell::new("Inputs"),
            Cell::new("Outputs"),
        ]);
    for action in &planned {
        let list = |items: &[String]| {
            if items.is_empty() {
                "-".to_string()
            } else {
                items.join("\n")
            }
        };
        table.add_row(vec![
            Cell::new(action.wave),
            Cell::new(&action.name),
            Cell::new(&action.job_type),
            Cell::new(&action.job_group),
            Cell::new(list(&action.inputs)),
            Cell::new(list(&action.outputs)),
        ]);
    }

    println!();
    println!(
        "  {} '{}' ({} actions)",
        style("Pipeline").bold(),
        style(HousingPipeline.project_name()).cyan(),
        graph.len()
    );
    println!();
    println!("{table}");
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_follows_waves() {
        let graph = HousingPipeline.to_graph(&PipelineConfig::new()).unwrap();
        let planned = plan(&graph).unwrap();
        let order: Vec<(usize, &str)> = planned
            .iter()
            .map(|a| (a.wave, a.name.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                (0, "IngestHousingDataset"),
                (1, "TrainLinearRegression"),
                (2, "EvaluateModel"),
            ]
        );
        assert_eq!(planned[2].parents, vec!["IngestHousingDataset", "TrainLinearRegression"]);
    }

    #[test]
    fn test_bad_assignment_is_an_error() {
        assert!(show_graph(&["rows".to_string()], true).is_err());
    }
}
