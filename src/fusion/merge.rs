//! 以日期合併各來源。
//!
//! 法人買賣超與成交資訊取交集，借券與千張大戶以左側為主補上；
//! 餘額、比率這類狀態值先向後延續再向前補齊，當日流量缺值視為 0。

use crate::{
    crawler::{InstitutionalFlow, LargeHolderRatio, LendingActivity, PriceVolume},
    fusion::table::{AlignedRow, SourceTable},
};

/// 兩個主要來源都有資料的日期才會留下
pub fn inner_join(
    institutional: &SourceTable<InstitutionalFlow>,
    prices: &SourceTable<PriceVolume>,
) -> Vec<AlignedRow> {
    institutional
        .iter()
        .filter_map(|(date, flow)| {
            prices.get(date).map(|price| AlignedRow {
                date: *date,
                foreign: flow.foreign,
                investment_trust: flow.investment_trust,
                dealer: flow.dealer,
                close: price.close,
                volume: price.volume,
                lending_sold: None,
                lending_returned: None,
                lending_adjusted: None,
                lending_balance: None,
                large_holder_ratio: None,
            })
        })
        .collect()
}

pub fn attach_lending(rows: &mut [AlignedRow], lending: &SourceTable<LendingActivity>) {
    let mut balances = Vec::with_capacity(rows.len());

    for row in rows.iter_mut() {
        let activity = lending.get(&row.date);
        row.lending_sold = Some(activity.and_then(|a| a.sold).unwrap_or(0));
        row.lending_returned = Some(activity.and_then(|a| a.returned).unwrap_or(0));
        row.lending_adjusted = Some(activity.and_then(|a| a.adjusted).unwrap_or(0));
        balances.push(activity.and_then(|a| a.balance));
    }

    fill_forward_backward(&mut balances);
    for (row, balance) in rows.iter_mut().zip(balances) {
        row.lending_balance = balance;
    }
}

pub fn attach_large_holder(rows: &mut [AlignedRow], ratios: &SourceTable<LargeHolderRatio>) {
    let mut values: Vec<_> = rows
        .iter()
        .map(|row| ratios.get(&row.date).map(|r| r.ratio))
        .collect();

    fill_forward_backward(&mut values);
    for (row, ratio) in rows.iter_mut().zip(values) {
        row.large_holder_ratio = ratio;
    }
}

/// 缺值先沿用前一個觀測值，開頭仍缺的再取後面第一個觀測值
pub fn fill_forward_backward<T: Clone>(values: &mut [Option<T>]) {
    let mut last: Option<T> = None;
    for value in values.iter_mut() {
        if value.is_some() {
            last = value.clone();
        } else {
            *value = last.clone();
        }
    }

    let mut next: Option<T> = None;
    for value in values.iter_mut().rev() {
        if value.is_some() {
            next = value.clone();
        } else {
            *value = next.clone();
        }
    }
}
