use convoy::measure::{partition, CommunityDistribution, MobilityProfile, Quantity};
use convoy::{CommunityConfig, MobileCommunities, MobilityGraph};
use std::collections::BTreeMap;

const RANGE: f64 = 60.0;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Two platoons on one road, travelling towards each other. They meet
    // around step 10, drive through each other and separate again. A
    // mobility-aware partition keeps them apart throughout.
    let mut graph = MobilityGraph::new();
    let mut positions = Vec::new();

    for i in 0..5 {
        let u = graph.add_agent(format!("east{i}"))?;
        let agent = graph.agent_mut(u).ok_or("missing agent")?;
        agent.speed = Some(25.0 + i as f64);
        agent.heading = Some(90.0);
        positions.push((u, i as f64 * 20.0, 1.0));
    }
    for i in 0..5 {
        let u = graph.add_agent(format!("west{i}"))?;
        let agent = graph.agent_mut(u).ok_or("missing agent")?;
        agent.speed = Some(22.0 + i as f64);
        agent.heading = Some(270.0);
        positions.push((u, 600.0 + i as f64 * 20.0, -1.0));
    }

    let config = CommunityConfig::from_value(serde_json::json!({
        "algorithm": "mobileSandSharc",
        "speedType": "timemean",
        "speedHistoryLength": 5,
        "congestionSpeedThreshold": 5.0,
        "seed": 42,
    }))?;
    let mut engine = MobileCommunities::new(config)?;

    for _ in 0..20 {
        // Move, then rebuild links from radio range.
        for (u, x, dir) in positions.iter_mut() {
            let speed = graph.agent(*u).and_then(|a| a.speed).unwrap_or(0.0);
            *x += *dir * speed;
        }
        for (i, &(a, xa, _)) in positions.iter().enumerate() {
            for &(b, xb, _) in &positions[i + 1..] {
                if (xa - xb).abs() <= RANGE {
                    graph.connect(a, b);
                } else {
                    graph.disconnect(a, b);
                }
            }
        }

        graph.advance_step();
        let report = engine.step(&mut graph);
        engine.check(&graph)?;

        let mut communities: BTreeMap<u64, Vec<String>> = BTreeMap::new();
        for (community, members) in partition(&graph) {
            let names = members
                .iter()
                .filter_map(|&u| graph.agent(u))
                .map(|a| a.name().to_string())
                .collect();
            communities.insert(community.raw(), names);
        }
        println!("{report}");
        for (id, mut names) in communities {
            names.sort();
            println!("  c{id}: {}", names.join(" "));
        }
    }

    let dist = CommunityDistribution::compute(&graph);
    let profile = MobilityProfile::compute(&graph, Quantity::TimeMeanSpeed);
    println!(
        "communities={} mean_size={:.2} speed_spread={:.2} within={:.2}",
        dist.communities, dist.mean_size, profile.std_dev_of_means, profile.mean_std_dev
    );
    Ok(())
}
