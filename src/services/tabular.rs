//! 表格解析与聚合计算
//!
//! 聚合（求和、计数、平均、最大、最小）直接在表格上计算，结果不经过 LLM

use std::sync::OnceLock;

use regex::Regex;
use scraper::{Html, Selector};

use crate::models::table::parse_numeric_cell;
use crate::models::Table;

// ========== 解析 ==========

/// 解析 CSV 文本
pub fn parse_csv(text: &str) -> Result<Table, String> {
    parse_delimited(text, b',')
}

/// 解析按 `delimiter` 分隔的文本（CSV 用 `,`，TSV 用 `\t`）
///
/// 第一行全是数字时视为数据，列名自动生成为 `column_1`、`column_2`……
pub fn parse_delimited(text: &str, delimiter: u8) -> Result<Table, String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| format!("表格解析失败: {}", e))?;
        if record.iter().all(|cell| cell.is_empty()) {
            continue;
        }
        records.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }

    let Some(first) = records.first() else {
        return Err("表格内容为空".to_string());
    };

    let header_is_data = first.iter().all(|cell| parse_numeric_cell(cell).is_some());
    if header_is_data {
        let width = records.iter().map(Vec::len).max().unwrap_or(0);
        let columns = (1..=width).map(|i| format!("column_{}", i)).collect();
        Ok(Table::new(columns, records))
    } else {
        let columns = records.remove(0);
        Ok(Table::new(columns, records))
    }
}

/// 取 HTML 中第一个有数据的 `<table>`
pub fn parse_html_table(html: &str) -> Option<Table> {
    let document = Html::parse_document(html);
    let table_selector = Selector::parse("table").ok()?;
    let row_selector = Selector::parse("tr").ok()?;
    let cell_selector = Selector::parse("th, td").ok()?;

    for table in document.select(&table_selector) {
        let mut rows: Vec<Vec<String>> = table
            .select(&row_selector)
            .map(|row| {
                row.select(&cell_selector)
                    .map(|cell| cell.text().collect::<String>().trim().to_string())
                    .collect::<Vec<_>>()
            })
            .filter(|cells| !cells.is_empty())
            .collect();

        if rows.len() < 2 {
            continue;
        }
        let columns = rows.remove(0);
        return Some(Table::new(columns, rows));
    }
    None
}

/// 页面没有 `<table>` 但正文主要是数字网格时，把数字合成为单列 `value` 表
///
/// 至少需要 3 个不同的数字，且数字行要占非空行的大多数（最多容忍 2 行标题或说明）
pub fn numeric_grid_table(text: &str) -> Option<Table> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let mut values = Vec::new();
    let mut prose_lines = 0;
    for line in &lines {
        match numeric_line(line) {
            Some(numbers) => values.extend(numbers),
            None => prose_lines += 1,
        }
    }

    let mut distinct: Vec<&String> = values.iter().collect();
    distinct.sort();
    distinct.dedup();
    let numeric_lines = lines.len() - prose_lines;
    if distinct.len() < 3 || prose_lines > 2 || prose_lines > numeric_lines {
        return None;
    }

    let rows = values.into_iter().map(|value| vec![value]).collect();
    Some(Table::new(vec!["value".to_string()], rows))
}

/// 整行都是数字时返回各个数字，否则 `None`
fn numeric_line(line: &str) -> Option<Vec<String>> {
    static THOUSANDS: OnceLock<Option<Regex>> = OnceLock::new();
    let thousands = THOUSANDS
        .get_or_init(|| Regex::new(r"^-?\d{1,3}(?:,\d{3})+(?:\.\d+)?$").ok())
        .as_ref()?;

    let mut numbers = Vec::new();
    for token in line.split(|c: char| c.is_whitespace() || matches!(c, ';' | '|')) {
        // html2text 输出的列表符号
        if token.chars().all(|c| matches!(c, '*' | '-' | '•' | '#' | '>')) {
            continue;
        }
        let pieces: Vec<&str> = if thousands.is_match(token) {
            vec![token]
        } else {
            token.split(',').filter(|piece| !piece.is_empty()).collect()
        };
        for piece in pieces {
            parse_numeric_cell(piece)?;
            numbers.push(piece.replace(',', ""));
        }
    }
    (!numbers.is_empty()).then_some(numbers)
}

// ========== 聚合 ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Sum,
    Count,
    Mean,
    Max,
    Min,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
}

impl Comparison {
    fn holds(&self, value: f64, threshold: f64) -> bool {
        match self {
            Comparison::Gt => value > threshold,
            Comparison::Ge => value >= threshold,
            Comparison::Lt => value < threshold,
            Comparison::Le => value <= threshold,
            Comparison::Eq => value == threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Filter {
    pub comparison: Comparison,
    pub threshold: f64,
}

/// 对某张表的一次聚合
#[derive(Debug, Clone, PartialEq)]
pub struct TabularQuery {
    pub aggregation: Aggregation,
    /// 为 `None` 时只能是无过滤的行计数
    pub column: Option<usize>,
    pub filter: Option<Filter>,
}

static AGGREGATION_PATTERNS: OnceLock<Vec<(Regex, Aggregation)>> = OnceLock::new();
static FILTER_PATTERNS: OnceLock<Vec<(Regex, Comparison)>> = OnceLock::new();

fn aggregation_patterns() -> &'static [(Regex, Aggregation)] {
    AGGREGATION_PATTERNS.get_or_init(|| {
        // 顺序有意义："total number of" 是计数，"sum of ... above" 是求和
        [
            (r"\b(average|mean)\b", Aggregation::Mean),
            (r"\b(sum|add up|added up)\b", Aggregation::Sum),
            (r"\b(how many|count|number of)\b", Aggregation::Count),
            (r"\b(max|maximum|highest|largest|biggest)\b", Aggregation::Max),
            (r"\b(min|minimum|lowest|smallest)\b", Aggregation::Min),
            (r"\btotal\b", Aggregation::Sum),
        ]
        .into_iter()
        .filter_map(|(pattern, agg)| Regex::new(pattern).ok().map(|re| (re, agg)))
        .collect()
    })
}

fn filter_patterns() -> &'static [(Regex, Comparison)] {
    FILTER_PATTERNS.get_or_init(|| {
        const NUMBER: &str =
            r"\s*(?:the\s+)?(?:cutoff\s+(?:value\s+)?(?:of\s+)?)?(-?[\d,]*\.?\d+)";
        [
            (r"(?:greater than or equal to|at least|no less than|>=|≥)", Comparison::Ge),
            (r"(?:less than or equal to|at most|no more than|<=|≤)", Comparison::Le),
            (
                r"(?:greater than|more than|larger than|above|over|exceeding|exceeds|>)",
                Comparison::Gt,
            ),
            (r"(?:less than|smaller than|below|under|<)", Comparison::Lt),
            (r"(?:equal to|equals)", Comparison::Eq),
        ]
        .into_iter()
        .filter_map(|(pattern, cmp)| {
            Regex::new(&format!("{}{}", pattern, NUMBER))
                .ok()
                .map(|re| (re, cmp))
        })
        .collect()
    })
}

/// 从题干中识别聚合类型
pub fn detect_aggregation(question: &str) -> Option<Aggregation> {
    let lowered = question.to_lowercase();
    aggregation_patterns()
        .iter()
        .find(|(re, _)| re.is_match(&lowered))
        .map(|(_, agg)| *agg)
}

/// 从题干中识别阈值过滤条件，如 "greater than 500"、"at least 1,000"
pub fn detect_filter(question: &str) -> Option<Filter> {
    let lowered = question.to_lowercase();
    filter_patterns().iter().find_map(|(re, comparison)| {
        let captures = re.captures(&lowered)?;
        let threshold = parse_numeric_cell(captures.get(1)?.as_str())?;
        Some(Filter {
            comparison: *comparison,
            threshold,
        })
    })
}

/// 为题干在表格上规划一次聚合
///
/// 只处理"对一列做一次聚合（可带一个作用于同一列的阈值）"。以下情况返回 `None`，
/// 交给带列摘要的推理提示词处理：
/// - 题干中出现去重、分组、行条件等未处理的限定词
/// - 题干提到了表格中的文本单元格值（按行筛选）
/// - 提到了多个数值列
/// - 阈值条件可能作用于另一列
/// - 无法确定要聚合的列
pub fn plan(question: &str, table: &Table) -> Option<TabularQuery> {
    if table.is_empty() {
        return None;
    }
    let lowered = question.to_lowercase();
    if has_unhandled_qualifier(&lowered) || mentions_cell_value(&lowered, table) {
        return None;
    }

    let aggregation = detect_aggregation(question)?;
    let filter = detect_filter(question);

    let numeric = table.numeric_columns();
    let mentioned = mentioned_columns(&lowered, table);
    let mentioned_numeric: Vec<usize> = mentioned
        .iter()
        .copied()
        .filter(|index| numeric.contains(index))
        .collect();

    let column = match (mentioned_numeric.as_slice(), numeric.as_slice()) {
        ([], [only]) => Some(*only),
        ([], _) => None,
        ([index], _) => Some(*index),
        _ => return None,
    };

    // 阈值只能作用于被聚合的那一列
    if filter.is_some() && mentioned.iter().any(|&index| Some(index) != column) {
        return None;
    }

    match (aggregation, column) {
        (_, Some(index)) => Some(TabularQuery {
            aggregation,
            column: Some(index),
            filter,
        }),
        (Aggregation::Count, None) if filter.is_none() && mentioned.is_empty() => {
            Some(TabularQuery {
                aggregation,
                column: None,
                filter: None,
            })
        }
        _ => None,
    }
}

/// 直接计算无法表达的限定词
fn has_unhandled_qualifier(lowered: &str) -> bool {
    static QUALIFIERS: OnceLock<Option<Regex>> = OnceLock::new();
    let qualifiers = QUALIFIERS.get_or_init(|| {
        Regex::new(concat!(
            r"\b(where|whose|which have|that have|for rows|for each|each|per|",
            r"unique|distinct|different|group(?:ed)? by|between|except|excluding|",
            r"median|ratio|percentage)\b",
        ))
        .ok()
    });
    match qualifiers {
        Some(re) => re.is_match(lowered),
        None => true,
    }
}

/// 题干中提到的列，名字被另一个已提到的列名包含时只保留较长的那个
fn mentioned_columns(lowered: &str, table: &Table) -> Vec<usize> {
    let names: Vec<String> = table
        .columns
        .iter()
        .map(|name| name.trim().to_lowercase())
        .collect();

    let hits: Vec<usize> = (0..names.len())
        .filter(|&index| !names[index].is_empty() && mentions_word(lowered, &names[index]))
        .collect();

    hits.iter()
        .copied()
        .filter(|&index| {
            !hits.iter().any(|&other| {
                other != index
                    && names[other].len() > names[index].len()
                    && names[other].contains(names[index].as_str())
            })
        })
        .collect()
}

/// 题干是否提到了非数值列中的某个单元格值，如 "price of apple"
fn mentions_cell_value(lowered: &str, table: &Table) -> bool {
    let numeric = table.numeric_columns();
    (0..table.columns.len())
        .filter(|index| !numeric.contains(index))
        .flat_map(|index| table.cells(index))
        .map(|cell| cell.trim().to_lowercase())
        .filter(|cell| cell.chars().count() >= 3)
        .any(|cell| mentions_word(lowered, &cell))
}

fn mentions_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let end = start + needle.len();
        let before = haystack[..start].chars().next_back();
        let after = haystack[end..].chars().next();
        !before.is_some_and(|c| c.is_alphanumeric())
            && !after.is_some_and(|c| c.is_alphanumeric())
    })
}

/// 执行聚合，结果确定且与 LLM 无关
///
/// 求和按输入的最大小数位数取整，保证 `0.1 + 0.2` 之类的小数列得到精确结果
pub fn execute(table: &Table, query: &TabularQuery) -> Option<f64> {
    let Some(column) = query.column else {
        return Some(table.rows.len() as f64);
    };

    let values: Vec<f64> = table
        .numeric_values(column)
        .into_iter()
        .filter(|value| match query.filter {
            Some(filter) => filter.comparison.holds(*value, filter.threshold),
            None => true,
        })
        .collect();

    match query.aggregation {
        Aggregation::Count => Some(values.len() as f64),
        Aggregation::Sum => {
            let sum: f64 = values.iter().sum();
            Some(round_to(sum, table.max_decimals(column)))
        }
        Aggregation::Mean if values.is_empty() => None,
        Aggregation::Mean => Some(values.iter().sum::<f64>() / values.len() as f64),
        Aggregation::Max => values.iter().copied().reduce(f64::max),
        Aggregation::Min => values.iter().copied().reduce(f64::min),
    }
}

pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
