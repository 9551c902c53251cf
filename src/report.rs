use crate::analyzer::{DatasetSummary, Dimension, Metric, RankingItem};
use anyhow::{Context, Result};
use csv::Writer;
use std::fs;
use std::path::Path;

pub fn ranking_title(metric: Metric, dimension: Dimension) -> String {
    let what = match dimension {
        Dimension::School => "Schools",
        Dimension::Program => "Programs",
    };
    match metric {
        Metric::Competitiveness => format!("{what} by Competitiveness (mean accepted average)"),
        Metric::Popularity => format!("{what} by Popularity (applications)"),
    }
}

/// File stem used for a ranking's report files, e.g. `competitiveness_by_school`.
pub fn ranking_file_stem(metric: Metric, dimension: Dimension) -> String {
    format!("{}_by_{}", metric.label(), dimension.label())
}

pub fn format_ranking(
    metric: Metric,
    dimension: Dimension,
    min_records: usize,
    ranking: &[RankingItem],
) -> String {
    let title = ranking_title(metric, dimension);
    let mut content = String::new();
    content.push_str(&title);
    content.push('\n');
    content.push_str(&"=".repeat(title.len()));
    content.push_str(&format!("\nMinimum records per {}: {}\n\n", dimension.label(), min_records));

    if ranking.is_empty() {
        content.push_str("No group met the minimum record count.\n");
        return content;
    }

    for (i, item) in ranking.iter().enumerate() {
        let line = match metric {
            Metric::Competitiveness => format!(
                "{:>3}. {} - {:.1} avg over {} accepted records [{}]\n",
                i + 1,
                item.name,
                item.average_grade.unwrap_or_default(),
                item.record_count,
                item.tier()
            ),
            Metric::Popularity => format!(
                "{:>3}. {} - {} applications, {}% accepted [{}]\n",
                i + 1,
                item.name,
                item.application_count.unwrap_or(item.record_count),
                item.acceptance_rate.unwrap_or_default(),
                item.tier()
            ),
        };
        content.push_str(&line);
    }
    content
}

pub fn write_ranking_report(
    metric: Metric,
    dimension: Dimension,
    min_records: usize,
    ranking: &[RankingItem],
    output_dir: &Path,
) -> Result<()> {
    let stem = ranking_file_stem(metric, dimension);
    let path = output_dir.join(format!("{stem}.txt"));
    fs::write(&path, format_ranking(metric, dimension, min_records, ranking))
        .with_context(|| format!("Failed to write report: {}", path.display()))?;
    write_ranking_csv(metric, ranking, &output_dir.join(format!("{stem}.csv")))
}

pub fn write_ranking_csv(metric: Metric, ranking: &[RankingItem], path: &Path) -> Result<()> {
    let mut writer = Writer::from_path(path)
        .with_context(|| format!("Failed to create CSV: {}", path.display()))?;

    match metric {
        Metric::Competitiveness => {
            writer.write_record(["Rank", "Name", "Average Grade", "Records", "Tier"])?;
            for (i, item) in ranking.iter().enumerate() {
                writer.write_record([
                    (i + 1).to_string(),
                    item.name.clone(),
                    format!("{:.1}", item.average_grade.unwrap_or_default()),
                    item.record_count.to_string(),
                    item.tier().to_string(),
                ])?;
            }
        }
        Metric::Popularity => {
            writer.write_record([
                "Rank",
                "Name",
                "Applications",
                "Acceptance Rate",
                "Records",
                "Tier",
            ])?;
            for (i, item) in ranking.iter().enumerate() {
                writer.write_record([
                    (i + 1).to_string(),
                    item.name.clone(),
                    item.application_count.unwrap_or(item.record_count).to_string(),
                    item.acceptance_rate.unwrap_or_default().to_string(),
                    item.record_count.to_string(),
                    item.tier().to_string(),
                ])?;
            }
        }
    }

    writer.flush()?;
    Ok(())
}

/// Terminal summary after a full run. Shows the top of each ranking.
pub fn print_summary(
    summary: &DatasetSummary,
    rankings: &[(Metric, Dimension, Vec<RankingItem>)],
    top: usize,
) {
    println!("\nSUMMARY");
    println!("=======");
    println!("Records: {}", summary.total_records);
    println!("Accepted: {}", summary.accepted_records);
    match summary.mean_accepted_average {
        Some(avg) => println!("Mean accepted average: {avg:.1}"),
        None => println!("Mean accepted average: n/a"),
    }

    for (metric, dimension, ranking) in rankings {
        println!("\n{}:", ranking_title(*metric, *dimension));
        if ranking.is_empty() {
            println!("   (no group met the minimum record count)");
        }
        for (i, item) in ranking.iter().take(top).enumerate() {
            match metric {
                Metric::Competitiveness => println!(
                    "   {}. {} - {:.1} ({})",
                    i + 1,
                    item.name,
                    item.average_grade.unwrap_or_default(),
                    item.tier()
                ),
                Metric::Popularity => println!(
                    "   {}. {} - {} applications, {}% accepted ({})",
                    i + 1,
                    item.name,
                    item.application_count.unwrap_or(item.record_count),
                    item.acceptance_rate.unwrap_or_default(),
                    item.tier()
                ),
            }
        }
    }
}
