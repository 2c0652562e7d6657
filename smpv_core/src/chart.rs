//! Stacked bar chart of effective power per position range.
//!
//! Interaction is modelled as state transitions on [`BarChart`]: legend
//! toggles restack from the binned rows, hover changes opacities and legend
//! fills, and [`BarChart::render_svg`] draws whatever the state currently is.

use std::{collections::BTreeSet, fmt, fmt::Write as _, str::FromStr};

use serde::{Deserialize, Serialize};
use smpv_schema::{ActorId, StackSeries, BUCKET_COUNT, POSITION_DOMAIN_MAX};

use crate::{
    binning::{BinnedTurn, ChartKey},
    config::ChartConfig,
    error::{Result, SmpvError},
    stack::{stack, stack_totals},
    svg::{element_id, escape_text, num, LinearScale},
};

pub const X_LABEL: &str = "Position";
pub const Y_LABEL: &str = "Effective Power (Influence x Salience)";

/// How the y axis is scaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartMode {
    /// Largest bucket total over every turn, so bars are comparable.
    #[default]
    Fixed,
    /// Largest bucket total of the shown turn.
    Responsive,
}

impl ChartMode {
    pub fn toggled(self) -> Self {
        match self {
            ChartMode::Fixed => ChartMode::Responsive,
            ChartMode::Responsive => ChartMode::Fixed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChartMode::Fixed => "fixed",
            ChartMode::Responsive => "responsive",
        }
    }
}

impl fmt::Display for ChartMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChartMode {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "fixed" => Ok(ChartMode::Fixed),
            "responsive" => Ok(ChartMode::Responsive),
            other => Err(format!("unknown chart mode {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoverTarget {
    Segment { actor: ActorId, bucket: usize },
    Legend(ActorId),
}

impl HoverTarget {
    pub fn actor(&self) -> ActorId {
        match *self {
            HoverTarget::Segment { actor, .. } | HoverTarget::Legend(actor) => actor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendEntry {
    pub actor: ActorId,
    pub label: String,
    pub element_id: String,
    pub visible: bool,
    pub fill: String,
}

pub struct BarChart {
    config: ChartConfig,
    binned: BinnedTurn,
    mode: ChartMode,
    highest_range: f64,
    hidden: BTreeSet<ActorId>,
    series: Vec<StackSeries>,
    hover: Option<HoverTarget>,
    tooltip: Option<String>,
}

impl BarChart {
    /// `hidden` may name actors missing from this turn; they are ignored.
    pub fn new(
        config: ChartConfig,
        binned: BinnedTurn,
        mode: ChartMode,
        highest_range: f64,
        hidden: &BTreeSet<ActorId>,
    ) -> Self {
        let hidden = binned
            .keys
            .iter()
            .map(|key| key.actor)
            .filter(|actor| hidden.contains(actor))
            .collect();
        let mut chart = Self {
            config,
            binned,
            mode,
            highest_range,
            hidden,
            series: Vec::new(),
            hover: None,
            tooltip: None,
        };
        chart.restack();
        chart
    }

    pub fn binned(&self) -> &BinnedTurn {
        &self.binned
    }

    pub fn keys(&self) -> &[ChartKey] {
        &self.binned.keys
    }

    pub fn mode(&self) -> ChartMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ChartMode) {
        self.mode = mode;
    }

    pub fn hidden(&self) -> &BTreeSet<ActorId> {
        &self.hidden
    }

    pub fn is_visible(&self, actor: ActorId) -> bool {
        !self.hidden.contains(&actor)
    }

    pub fn series(&self) -> &[StackSeries] {
        &self.series
    }

    pub fn active_keys(&self) -> Vec<ActorId> {
        self.binned
            .keys
            .iter()
            .map(|key| key.actor)
            .filter(|actor| self.is_visible(*actor))
            .collect()
    }

    /// Height of each stacked bar with the current visibility.
    pub fn totals(&self) -> Vec<f64> {
        stack_totals(&self.series, self.binned.buckets.len())
    }

    /// Y domain after rounding to nice tick values.
    pub fn y_domain(&self) -> (f64, f64) {
        self.y_scale().domain
    }

    fn y_scale(&self) -> LinearScale {
        let max = match self.mode {
            ChartMode::Fixed => self.highest_range,
            ChartMode::Responsive => self.binned.max_total(),
        };
        LinearScale::new((0.0, max), (self.config.inner_height(), 0.0)).nice(self.config.y_ticks)
    }

    fn x_scale(&self) -> LinearScale {
        LinearScale::new((0.0, POSITION_DOMAIN_MAX), (0.0, self.config.inner_width()))
    }

    /// Flips an actor's visibility and restacks. Returns the new visibility.
    pub fn toggle_actor(&mut self, actor: ActorId) -> Result<bool> {
        if self.binned.key_index(actor).is_none() {
            return Err(SmpvError::UnknownActor(actor));
        }
        if self.hidden.remove(&actor) {
            self.restack();
            return Ok(true);
        }
        if self.active_keys().len() <= 1 {
            return Err(SmpvError::NoVisibleActors);
        }
        if self.hover.is_some_and(|target| target.actor() == actor) {
            self.clear_hover();
        }
        self.hidden.insert(actor);
        self.restack();
        Ok(false)
    }

    fn restack(&mut self) {
        self.series = stack(&self.binned, &self.active_keys());
    }

    /// Emphasises one actor. Segment targets also produce a tooltip.
    pub fn hover(&mut self, target: HoverTarget) -> Result<Option<String>> {
        let actor = target.actor();
        if self.binned.key_index(actor).is_none() {
            return Err(SmpvError::UnknownActor(actor));
        }
        self.tooltip = match target {
            HoverTarget::Segment { actor, bucket } => {
                let series = self
                    .series
                    .iter()
                    .find(|series| series.actor == actor)
                    .ok_or(SmpvError::ActorHidden(actor))?;
                series
                    .segments
                    .get(bucket)
                    .map(|segment| format!("Effective Power: {}", num(segment.value())))
            }
            HoverTarget::Legend(_) => None,
        };
        self.hover = Some(target);
        Ok(self.tooltip.clone())
    }

    pub fn clear_hover(&mut self) {
        self.hover = None;
        self.tooltip = None;
    }

    pub fn hovered(&self) -> Option<HoverTarget> {
        self.hover
    }

    pub fn tooltip(&self) -> Option<&str> {
        self.tooltip.as_deref()
    }

    pub fn opacity(&self, actor: ActorId) -> f64 {
        match self.hover {
            Some(target) if target.actor() != actor => self.config.dimmed_opacity,
            _ => 1.0,
        }
    }

    pub fn legend(&self) -> Vec<LegendEntry> {
        self.binned
            .keys
            .iter()
            .map(|key| {
                let visible = self.is_visible(key.actor);
                let colored = match self.hover {
                    Some(target) => target.actor() == key.actor,
                    None => visible,
                };
                LegendEntry {
                    actor: key.actor,
                    label: key.label.clone(),
                    element_id: format!("Blegend_{}", element_id(&key.label)),
                    visible,
                    fill: if colored {
                        key.color.to_string()
                    } else {
                        self.config.inactive_fill.clone()
                    },
                }
            })
            .collect()
    }

    pub fn render_svg(&self) -> String {
        let config = &self.config;
        let inner_width = config.inner_width();
        let inner_height = config.inner_height();
        let x_scale = self.x_scale();
        let y_scale = self.y_scale();
        let columns = config.legend_columns.max(1);
        let legend_rows = self.binned.keys.len().div_ceil(columns);
        let legend_height = config.legend_top + legend_rows as f64 * config.legend_row_height;
        let total_height = config.height + legend_height;

        let mut svg = String::new();
        let _ = writeln!(
            svg,
            "<svg xmlns='http://www.w3.org/2000/svg' width='{w}' height='{h}' viewBox='0 0 {w} {h}' class='bar-chart'>",
            w = num(config.width),
            h = num(total_height),
        );
        let _ = writeln!(
            svg,
            "  <g transform='translate({} {})'>",
            num(config.margin.left),
            num(config.margin.top)
        );

        // Gridlines
        let _ = writeln!(
            svg,
            "    <g class='grid' stroke='#000' stroke-opacity='0.2' stroke-dasharray='2' shape-rendering='crispEdges'>"
        );
        for tick in x_scale.ticks(BUCKET_COUNT) {
            let x = num(x_scale.apply(tick));
            let _ = writeln!(
                svg,
                "      <line x1='{x}' y1='0' x2='{x}' y2='{}'/>",
                num(inner_height)
            );
        }
        for tick in y_scale.ticks(config.y_ticks) {
            let y = num(y_scale.apply(tick));
            let _ = writeln!(
                svg,
                "      <line x1='0' y1='{y}' x2='{}' y2='{y}'/>",
                num(inner_width)
            );
        }
        let _ = writeln!(svg, "    </g>");

        self.write_bars(&mut svg, &x_scale, &y_scale);
        self.write_axes(&mut svg, &x_scale, &y_scale);

        if let Some(tooltip) = &self.tooltip {
            let _ = writeln!(
                svg,
                "    <g class='tooltip'><text x='50' dy='1.2em' text-anchor='middle' font-size='10px' font-weight='bold'>{}</text></g>",
                escape_text(tooltip)
            );
        }
        let _ = writeln!(svg, "  </g>");

        self.write_legend(&mut svg);
        let _ = writeln!(svg, "</svg>");
        svg
    }

    fn write_bars(&self, svg: &mut String, x_scale: &LinearScale, y_scale: &LinearScale) {
        let config = &self.config;
        let bucket_count = self.binned.buckets.len().max(1);
        let bar_width = (config.inner_width() / bucket_count as f64 - config.bar_gap).max(0.0);
        let base = y_scale.apply(0.0);

        for series in &self.series {
            let opacity = num(self.opacity(series.actor));
            let _ = writeln!(
                svg,
                "    <g class='layer' id='Actor_{}' fill='{}' opacity='{opacity}'>",
                escape_text(&element_id(&series.label)),
                series.color,
            );
            if self.hover.is_some() {
                let _ = writeln!(
                    svg,
                    "      <animate attributeName='opacity' from='1' to='{opacity}' dur='{}ms' fill='freeze'/>",
                    config.highlight_ms
                );
            }
            for segment in &series.segments {
                let Some(bucket) = self.binned.buckets.get(segment.bucket) else {
                    continue;
                };
                let x = x_scale.apply(bucket.lower_bound()) + config.bar_inset;
                let y = y_scale.apply(segment.high);
                let height = (y_scale.apply(segment.low) - y).max(0.0);
                let _ = writeln!(
                    svg,
                    "      <rect x='{}' y='{}' width='{}' height='{}'>",
                    num(x),
                    num(y),
                    num(bar_width),
                    num(height)
                );
                let _ = writeln!(
                    svg,
                    "        <animate attributeName='y' from='{}' to='{}' dur='{}ms' fill='freeze'/>",
                    num(base),
                    num(y),
                    config.transition_ms
                );
                let _ = writeln!(
                    svg,
                    "        <animate attributeName='height' from='0' to='{}' dur='{}ms' fill='freeze'/>",
                    num(height),
                    config.transition_ms
                );
                let _ = writeln!(
                    svg,
                    "        <title>Effective Power: {}</title>",
                    num(segment.value())
                );
                let _ = writeln!(svg, "      </rect>");
            }
            let _ = writeln!(svg, "    </g>");
        }
    }

    fn write_axes(&self, svg: &mut String, x_scale: &LinearScale, y_scale: &LinearScale) {
        let inner_width = self.config.inner_width();
        let inner_height = self.config.inner_height();

        let _ = writeln!(
            svg,
            "    <g class='x axis' transform='translate(0 {})' font-size='10' text-anchor='middle'>",
            num(inner_height)
        );
        let _ = writeln!(
            svg,
            "      <line x1='0' y1='0' x2='{}' y2='0' stroke='#000'/>",
            num(inner_width)
        );
        for tick in x_scale.ticks(BUCKET_COUNT) {
            let x = num(x_scale.apply(tick));
            let _ = writeln!(
                svg,
                "      <g class='tick' transform='translate({x} 0)'><line y2='6' stroke='#000'/><text y='9' dy='0.71em'>{}</text></g>",
                num(tick)
            );
        }
        let _ = writeln!(svg, "    </g>");
        let _ = writeln!(
            svg,
            "    <text class='CharLabel' transform='translate({} {})' text-anchor='middle'>{X_LABEL}</text>",
            num(inner_width / 2.0),
            num(inner_height + self.config.margin.bottom)
        );

        let _ = writeln!(
            svg,
            "    <g class='y axis' font-size='10' text-anchor='end'>"
        );
        let _ = writeln!(
            svg,
            "      <line x1='0' y1='0' x2='0' y2='{}' stroke='#000'/>",
            num(inner_height)
        );
        for tick in y_scale.ticks(self.config.y_ticks) {
            let y = num(y_scale.apply(tick));
            let _ = writeln!(
                svg,
                "      <g class='tick' transform='translate(0 {y})'><line x2='-6' stroke='#000'/><text x='-9' dy='0.32em'>{}</text></g>",
                num(tick)
            );
        }
        let _ = writeln!(svg, "    </g>");
        let _ = writeln!(
            svg,
            "    <text class='CharLabel' transform='rotate(-90)' y='{}' x='{}' dy='1em' text-anchor='middle'>{Y_LABEL}</text>",
            num(-self.config.margin.left),
            num(-inner_height / 2.0)
        );
    }

    fn write_legend(&self, svg: &mut String) {
        let config = &self.config;
        let columns = config.legend_columns.max(1);
        let _ = writeln!(
            svg,
            "  <g class='legend' transform='translate({} {})'>",
            num(config.margin.left),
            num(config.height)
        );
        for (index, entry) in self.legend().iter().enumerate() {
            let x_offset = (index % columns) as f64 * config.legend_column_width;
            let y_offset = (index / columns) as f64 * config.legend_row_height + config.legend_top;
            let _ = writeln!(
                svg,
                "    <g transform='translate({} {})'>",
                num(x_offset),
                num(y_offset)
            );
            let _ = writeln!(
                svg,
                "      <rect id='{}' width='10' height='10' fill='{}'/>",
                escape_text(&entry.element_id),
                escape_text(&entry.fill)
            );
            let _ = writeln!(
                svg,
                "      <text x='15' y='5' dy='0.32em' font-size='10'>{}</text>",
                escape_text(&entry.label)
            );
            let _ = writeln!(svg, "    </g>");
        }
        let _ = writeln!(svg, "  </g>");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binning::ActorPower;
    use smpv_schema::HslColor;

    fn binned() -> BinnedTurn {
        let keys = [(1, "Alpha"), (2, "Beta Group"), (3, "U.N.")]
            .into_iter()
            .map(|(id, label)| ChartKey {
                actor: ActorId(id),
                label: label.to_string(),
                color: HslColor::from_power(25.0, 50.0),
            })
            .collect();
        let samples = [(1, 20.0, 5.0), (2, 42.0, 35.0), (3, 30.0, 35.0)].map(
            |(id, power, position)| ActorPower {
                actor: ActorId(id),
                power: Some(power),
                position: Some(position),
            },
        );
        BinnedTurn::bin(0, keys, &samples)
    }

    fn chart(mode: ChartMode) -> BarChart {
        BarChart::new(
            ChartConfig::default(),
            binned(),
            mode,
            97.0,
            &BTreeSet::new(),
        )
    }

    #[test]
    fn domain_depends_on_mode() {
        assert_eq!(chart(ChartMode::Fixed).y_domain(), (0.0, 100.0));
        assert_eq!(chart(ChartMode::Responsive).y_domain(), (0.0, 80.0));
    }

    #[test]
    fn toggle_off_and_on_restores_totals() {
        let mut chart = chart(ChartMode::Fixed);
        let before = chart.totals();
        assert!(!chart.toggle_actor(ActorId(2)).unwrap());
        assert_eq!(chart.totals()[3], 30.0);
        assert_eq!(chart.series().len(), 2);
        assert!(chart.toggle_actor(ActorId(2)).unwrap());
        assert_eq!(chart.totals(), before);
    }

    #[test]
    fn last_visible_actor_cannot_be_hidden() {
        let mut chart = chart(ChartMode::Fixed);
        chart.toggle_actor(ActorId(1)).unwrap();
        chart.toggle_actor(ActorId(2)).unwrap();
        let err = chart.toggle_actor(ActorId(3)).unwrap_err();
        assert!(matches!(err, SmpvError::NoVisibleActors));
        assert_eq!(chart.active_keys(), vec![ActorId(3)]);
    }

    #[test]
    fn unknown_actor_toggle_is_an_error() {
        let mut chart = chart(ChartMode::Fixed);
        assert!(matches!(
            chart.toggle_actor(ActorId(9)),
            Err(SmpvError::UnknownActor(ActorId(9)))
        ));
    }

    #[test]
    fn segment_hover_dims_others_and_reports_value() {
        let mut chart = chart(ChartMode::Fixed);
        let tooltip = chart
            .hover(HoverTarget::Segment {
                actor: ActorId(2),
                bucket: 3,
            })
            .unwrap();
        assert_eq!(tooltip.as_deref(), Some("Effective Power: 42"));
        assert_eq!(chart.opacity(ActorId(2)), 1.0);
        assert_eq!(chart.opacity(ActorId(1)), 0.2);
        let fills: Vec<String> = chart.legend().into_iter().map(|entry| entry.fill).collect();
        assert_eq!(fills, vec!["#F1F1F2", "hsl(60,100%,50%)", "#F1F1F2"]);

        chart.clear_hover();
        assert_eq!(chart.opacity(ActorId(1)), 1.0);
        assert_eq!(chart.tooltip(), None);
    }

    #[test]
    fn hiding_the_hovered_actor_drops_the_tooltip() {
        let mut chart = chart(ChartMode::Fixed);
        chart
            .hover(HoverTarget::Segment {
                actor: ActorId(2),
                bucket: 3,
            })
            .unwrap();
        assert!(!chart.toggle_actor(ActorId(2)).unwrap());
        assert_eq!(chart.hovered(), None);
        assert_eq!(chart.tooltip(), None);
        assert_eq!(chart.opacity(ActorId(1)), 1.0);
        let svg = chart.render_svg();
        assert!(!svg.contains("class='tooltip'"));
        assert!(!svg.contains(" opacity='0.2'"));
    }

    #[test]
    fn hiding_another_actor_keeps_the_hover() {
        let mut chart = chart(ChartMode::Fixed);
        chart.hover(HoverTarget::Legend(ActorId(2))).unwrap();
        chart.toggle_actor(ActorId(1)).unwrap();
        assert_eq!(chart.hovered(), Some(HoverTarget::Legend(ActorId(2))));
    }

    #[test]
    fn segment_hover_on_hidden_actor_is_refused() {
        let mut chart = chart(ChartMode::Fixed);
        chart.toggle_actor(ActorId(3)).unwrap();
        let err = chart
            .hover(HoverTarget::Segment {
                actor: ActorId(3),
                bucket: 3,
            })
            .unwrap_err();
        assert!(matches!(err, SmpvError::ActorHidden(ActorId(3))));
        assert!(matches!(
            chart.hover(HoverTarget::Legend(ActorId(9))),
            Err(SmpvError::UnknownActor(ActorId(9)))
        ));
        assert_eq!(chart.hovered(), None);
    }

    #[test]
    fn hover_animates_layer_opacity() {
        let mut chart = chart(ChartMode::Fixed);
        assert!(!chart.render_svg().contains("attributeName='opacity'"));
        chart.hover(HoverTarget::Legend(ActorId(1))).unwrap();
        let svg = chart.render_svg();
        assert!(svg.contains(
            "<animate attributeName='opacity' from='1' to='0.2' dur='50ms' fill='freeze'/>"
        ));
        assert!(svg.contains(
            "<animate attributeName='opacity' from='1' to='1' dur='50ms' fill='freeze'/>"
        ));
    }

    #[test]
    fn hidden_actors_stay_grey_after_hover() {
        let mut chart = chart(ChartMode::Fixed);
        chart.toggle_actor(ActorId(1)).unwrap();
        chart.hover(HoverTarget::Legend(ActorId(2))).unwrap();
        chart.clear_hover();
        let legend = chart.legend();
        assert!(!legend[0].visible);
        assert_eq!(legend[0].fill, "#F1F1F2");
        assert_eq!(legend[1].fill, "hsl(60,100%,50%)");
    }

    #[test]
    fn legend_ids_are_sanitised() {
        let ids: Vec<String> = chart(ChartMode::Fixed)
            .legend()
            .into_iter()
            .map(|entry| entry.element_id)
            .collect();
        assert_eq!(ids, vec!["Blegend_Alpha", "Blegend_BetaGroup", "Blegend_UN"]);
    }

    #[test]
    fn svg_contains_bars_labels_and_legend() {
        let mut chart = chart(ChartMode::Responsive);
        chart.toggle_actor(ActorId(3)).unwrap();
        let svg = chart.render_svg();
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("id='Actor_Alpha'"));
        assert!(!svg.contains("id='Actor_UN'"));
        assert!(svg.contains("id='Blegend_UN' width='10' height='10' fill='#F1F1F2'"));
        assert!(svg.contains(X_LABEL));
        assert!(svg.contains(Y_LABEL));
        assert!(svg.contains("dur='3000ms'"));
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn mode_parses_from_text() {
        assert_eq!("Responsive".parse::<ChartMode>(), Ok(ChartMode::Responsive));
        assert!("sideways".parse::<ChartMode>().is_err());
        assert_eq!(ChartMode::Fixed.toggled(), ChartMode::Responsive);
    }
}
