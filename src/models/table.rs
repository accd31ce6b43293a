//! 表格数据模型
//!
//! CSV 文件和 HTML 表格统一解析为 `Table`，单元格保留原始字符串，
//! 数值视图在需要时再解析

use serde::Serialize;

/// 二维表格
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// 单列统计摘要
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub column: String,
    pub count: usize,
    pub sum: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 指定列的原始单元格
    pub fn cells(&self, index: usize) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .filter_map(move |row| row.get(index).map(String::as_str))
    }

    /// 指定列中能解析为数字的值，无法解析的单元格被跳过
    pub fn numeric_values(&self, index: usize) -> Vec<f64> {
        self.cells(index).filter_map(parse_numeric_cell).collect()
    }

    /// 至少一半非空单元格为数字的列视为数值列
    pub fn numeric_columns(&self) -> Vec<usize> {
        (0..self.columns.len())
            .filter(|&index| {
                let non_empty = self.cells(index).filter(|c| !c.trim().is_empty()).count();
                let numeric = self.numeric_values(index).len();
                numeric > 0 && numeric * 2 >= non_empty
            })
            .collect()
    }

    /// 列中数值单元格的最大小数位数
    pub fn max_decimals(&self, index: usize) -> u32 {
        self.cells(index)
            .filter(|c| parse_numeric_cell(c).is_some())
            .map(decimal_places)
            .max()
            .unwrap_or(0)
    }

    /// 所有数值列的统计摘要
    pub fn summaries(&self) -> Vec<ColumnSummary> {
        self.numeric_columns()
            .into_iter()
            .filter_map(|index| {
                let values = self.numeric_values(index);
                if values.is_empty() {
                    return None;
                }
                let sum: f64 = values.iter().sum();
                let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                Some(ColumnSummary {
                    column: self.columns[index].clone(),
                    count: values.len(),
                    sum,
                    mean: sum / values.len() as f64,
                    min,
                    max,
                })
            })
            .collect()
    }

    /// 生成给 LLM 看的紧凑文本：表头 + 前 `max_rows` 行
    pub fn preview(&self, max_rows: usize) -> String {
        let mut out = self.columns.join(" | ");
        for row in self.rows.iter().take(max_rows) {
            out.push('\n');
            out.push_str(&row.join(" | "));
        }
        if self.rows.len() > max_rows {
            out.push_str(&format!("\n... (共 {} 行)", self.rows.len()));
        }
        out
    }
}

/// 解析数值单元格，容忍千分位逗号、货币符号和百分号
pub fn parse_numeric_cell(cell: &str) -> Option<f64> {
    let cleaned: String = cell
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | '€' | '£' | '¥' | '%' | ' '))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn decimal_places(cell: &str) -> u32 {
    let trimmed = cell.trim();
    match trimmed.split_once('.') {
        Some((_, fraction)) => fraction.chars().take_while(|c| c.is_ascii_digit()).count() as u32,
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::new(
            vec!["name".into(), "price".into()],
            vec![
                vec!["apple".into(), "1.25".into()],
                vec!["pear".into(), "$2,000".into()],
                vec!["plum".into(), "n/a".into()],
            ],
        )
    }

    #[test]
    fn test_numeric_cell_parsing() {
        assert_eq!(parse_numeric_cell("$2,000"), Some(2000.0));
        assert_eq!(parse_numeric_cell(" 12.5% "), Some(12.5));
        assert_eq!(parse_numeric_cell("n/a"), None);
        assert_eq!(parse_numeric_cell(""), None);
    }

    #[test]
    fn test_numeric_columns_and_summaries() {
        let table = sample();
        assert_eq!(table.numeric_columns(), vec![1]);
        let summary = &table.summaries()[0];
        assert_eq!(summary.column, "price");
        assert_eq!(summary.count, 2);
        assert_eq!(summary.sum, 2001.25);
        assert_eq!(summary.max, 2000.0);
        assert_eq!(table.max_decimals(1), 2);
    }
}
