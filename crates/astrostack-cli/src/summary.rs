use std::path::Path;

use astrostack_core::stack::{FrameSelection, StackingAlgorithm, StackingConfig};
use console::Style;

struct Styles {
    title: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
    warning: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
            warning: Style::new().yellow().bold(),
        }
    }
}

pub fn print_stack_summary(config: &StackingConfig, n_frames: usize, output: &Path) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Stacking"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(8)));
    println!();
    println!("  {:<14}{}", s.label.apply_to("Frames"), s.value.apply_to(n_frames));
    println!("  {:<14}{}", s.label.apply_to("Output"), s.path.apply_to(output.display()));
    println!(
        "  {:<14}{}",
        s.label.apply_to("Algorithm"),
        s.method.apply_to(&config.algorithm)
    );
    print_algorithm_params(&s, &config.algorithm);
    println!("  {:<14}{}", s.label.apply_to("Threads"), s.value.apply_to(config.n_cpu));
    match config.memory_limit_mb {
        Some(mb) => println!(
            "  {:<14}{}",
            s.label.apply_to("Memory"),
            s.value.apply_to(format!("{mb} MB"))
        ),
        None => println!(
            "  {:<14}{}",
            s.label.apply_to("Memory"),
            s.disabled.apply_to("unlimited")
        ),
    }
    let selection = match config.selection {
        FrameSelection::All => "all valid frames".to_string(),
        FrameSelection::Best { count } => format!("best {count}"),
        FrameSelection::BestFraction { fraction } => format!("best {:.0}%", fraction * 100.0),
    };
    println!("  {:<14}{}", s.label.apply_to("Keep"), s.value.apply_to(selection));
    if config.interpolate_colors {
        println!("  {:<14}{}", s.label.apply_to("Debayer"), s.method.apply_to("bilinear"));
    }
    println!();
}

fn print_algorithm_params(s: &Styles, algorithm: &StackingAlgorithm) {
    match algorithm {
        StackingAlgorithm::KappaSigmaMean(p) | StackingAlgorithm::KappaSigmaMedian(p) => {
            println!("    {:<12}{}", s.label.apply_to("Kappa"), s.value.apply_to(p.kappa));
            println!(
                "    {:<12}{}",
                s.label.apply_to("Iterations"),
                s.value.apply_to(p.iterations)
            );
        }
        StackingAlgorithm::CutOffAverage(p) => {
            println!(
                "    {:<12}{}",
                s.label.apply_to("Tail cut"),
                s.value.apply_to(format!("{:.0}%", p.tail_fraction * 100.0))
            );
        }
        StackingAlgorithm::Quantile(p) => {
            println!("    {:<12}{}", s.label.apply_to("Fraction"), s.value.apply_to(p.fraction));
        }
        StackingAlgorithm::Center(p) => {
            println!(
                "    {:<12}{}",
                s.label.apply_to("Center"),
                s.value.apply_to(p.central_value)
            );
        }
        _ => {}
    }
}

pub fn print_alignment_summary(n_frames: usize, n_failed: usize, output: &Path) {
    let s = Styles::new();

    println!();
    println!(
        "  {:<14}{}",
        s.label.apply_to("Aligned"),
        s.value.apply_to(n_frames - n_failed)
    );
    if n_failed > 0 {
        println!("  {:<14}{}", s.label.apply_to("Failed"), s.warning.apply_to(n_failed));
    }
    println!("  {:<14}{}", s.label.apply_to("Saved to"), s.path.apply_to(output.display()));
    println!();
}
